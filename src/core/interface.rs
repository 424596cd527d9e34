//! Per-node typing results and the write-once map that holds them.

use serde::{Serialize, Deserialize};

use crate::ast::NodeId;
use crate::core::types::Type;
use crate::errors::{EvalError, TypeError};

/// Which kind of settable cell backs a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutability {
    /// Edits are written back into the document source
    Code,
    /// Edits live only as long as the session
    Session,
}

impl Mutability {
    pub fn label(self) -> &'static str {
        match self {
            Mutability::Code => "Code",
            Mutability::Session => "Session",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Code" => Some(Mutability::Code),
            "Session" => Some(Mutability::Session),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Typing {
    pub ty: Type,
    /// The runtime value is time-varying and represented as a signal
    pub dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutable: Option<Mutability>,
}

impl Typing {
    pub fn new(ty: Type, dynamic: bool) -> Self {
        Self { ty, dynamic, mutable: None }
    }

    pub fn fixed(ty: Type) -> Self {
        Self::new(ty, false)
    }

    pub fn with_mutable(mut self, mutable: Option<Mutability>) -> Self {
        self.mutable = mutable;
        self
    }

    /// Drop the mutability tag once the value is read.
    pub fn deref(self) -> Self {
        Self { mutable: None, ..self }
    }
}

pub type Interface = Result<Typing, TypeError>;

/// The type an interface contributes to its parent: `Error` for a failed node.
pub fn interface_type(interface: &Interface) -> Type {
    match interface {
        Ok(typing) => typing.ty.clone(),
        Err(error) => Type::error(error.clone()),
    }
}

pub fn interface_dynamic(interface: &Interface) -> bool {
    matches!(interface, Ok(typing) if typing.dynamic)
}

/// Typechecking results for one document, keyed by arena index.
///
/// Each node is recorded at most once; recording an already visited node returns the existing
/// entry unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceMap {
    entries: Vec<Option<Interface>>,
}

impl InterfaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize) -> Self {
        Self { entries: vec![None; nodes] }
    }

    /// Record `interface` for `node` and return the entry now held, which is the earlier one if
    /// `node` was already recorded.
    pub fn record(&mut self, node: NodeId, interface: Interface) -> Interface {
        self.slot(node).get_or_insert(interface).clone()
    }

    /// Like [`record`](Self::record) for callers that only need the entry stored.
    pub fn insert(&mut self, node: NodeId, interface: Interface) {
        let slot = self.slot(node);
        if slot.is_none() {
            *slot = Some(interface);
        }
    }

    fn slot(&mut self, node: NodeId) -> &mut Option<Interface> {
        let index = node.index();
        if index >= self.entries.len() {
            self.entries.resize(index + 1, None);
        }
        &mut self.entries[index]
    }

    pub fn get(&self, node: NodeId) -> Option<&Interface> {
        self.entries.get(node.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    /// Lookup for a node the checker must have visited.
    pub fn require(&self, node: NodeId) -> Result<&Interface, EvalError> {
        self.get(node)
            .ok_or_else(|| EvalError::internal(format!("no interface recorded for node {}", node)))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Interface)> {
        self.entries.iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.as_ref().map(|iface| (NodeId::from_index(i), iface)))
    }

    /// Every distinct recorded error, ordered by source position.
    pub fn errors(&self) -> Vec<TypeError> {
        let mut errors: Vec<TypeError> = self.iter()
            .filter_map(|(_, iface)| iface.as_ref().err().cloned())
            .collect();
        errors.sort_by_key(|e| e.span.map(|s| (s.start, s.end)));
        let mut distinct: Vec<TypeError> = Vec::with_capacity(errors.len());
        for error in errors {
            if !distinct.contains(&error) {
                distinct.push(error);
            }
        }
        distinct
    }

    pub fn to_json(&self) -> serde_json::Value {
        let entries = self.iter()
            .map(|(node, iface)| {
                let result = match iface {
                    Ok(typing) => serde_json::json!({
                        "type": typing.ty.to_string(),
                        "dynamic": typing.dynamic,
                        "mutable": typing.mutable.map(Mutability::label),
                    }),
                    Err(error) => serde_json::json!({ "error": error.to_string() }),
                };
                (node.to_string(), result)
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(entries)
    }
}
