//! Whole-document compilation
//!
//! A document is a list of top-level fragments over one [`Ast`]. Fragments are checked and
//! evaluated in dependency order, so a fragment may use a binding defined further down. Host
//! context enters through a [`Prelude`]; other documents enter through module environments.

pub mod graph;

use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::analysis::annotation::{cell_of, resolve_annotation};
use crate::analysis::{ModuleTypeEnv, TypeChecker};
use crate::ast::{Ast, NodeId, NodeKind};
use crate::core::env::TypeEnv;
use crate::core::interface::{Interface, InterfaceMap, Mutability, Typing};
use crate::core::types::{ModuleField, Type};
use crate::errors::{ErrorCollector, ErrorKind, EvalError, TypeError};
use crate::eval::{EvalOptions, Evaluator, ModuleValueEnv, Value, ValueEnv, WriteBack};
use crate::infrastructure::config::CheckConfig;
use crate::performance::cache::{subtree, CacheEntry, CacheKey, CheckCache};
use crate::signal::Signal;

pub use graph::{defined_names, fragment_groups, FragmentGroup};

/// A parsed document: the node arena and its top-level fragments in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub ast: Ast,
    pub fragments: Vec<NodeId>,
}

impl Document {
    pub fn new(ast: Ast, fragments: Vec<NodeId>) -> Self {
        Self { ast, fragments }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Typings of host-provided names, usable from any thread.
pub type HostTypes = IndexMap<String, Typing>;

/// Host context visible to a document: clocks, pointer position, settings and the like.
///
/// Dynamic entries are signals the host keeps driving; the document only reads them.
#[derive(Clone, Default)]
pub struct Prelude {
    types: HostTypes,
    values: IndexMap<String, Value>,
}

impl Prelude {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static(mut self, name: &str, ty: Type, value: impl Into<Value>) -> Self {
        self.types.insert(name.to_string(), Typing::fixed(ty));
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn with_dynamic(mut self, name: &str, ty: Type, signal: Signal<Value>) -> Self {
        self.types.insert(name.to_string(), Typing::new(ty, true));
        self.values.insert(name.to_string(), Value::Signal(signal));
        self
    }

    /// A settable entry; assignments from the document write into `signal`.
    pub fn with_cell(mut self, name: &str, mutability: Mutability, ty: Type, signal: Signal<Value>) -> Self {
        self.types.insert(name.to_string(), Typing::new(ty, true).with_mutable(Some(mutability)));
        self.values.insert(name.to_string(), Value::Signal(signal));
        self
    }

    pub fn types(&self) -> &HostTypes {
        &self.types
    }

    pub fn type_env(&self) -> TypeEnv {
        host_env(&self.types)
    }

    pub fn value_env(&self) -> ValueEnv {
        ValueEnv::new().extend_all(
            self.values.iter().map(|(name, value)| (name.clone(), value.clone())).collect::<Vec<_>>()
        )
    }
}

fn host_env(types: &HostTypes) -> TypeEnv {
    TypeEnv::new().extend_all(
        types.iter().map(|(name, typing)| (name.clone(), Ok(typing.clone()))).collect::<Vec<_>>()
    )
}

/// Checks documents against host typings and other modules' export types.
#[derive(Clone, Default)]
pub struct DocumentCompiler {
    config: CheckConfig,
    modules: ModuleTypeEnv,
    host: HostTypes,
    cache: Option<Arc<CheckCache>>,
}

impl DocumentCompiler {
    pub fn new(config: CheckConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn with_modules(mut self, modules: ModuleTypeEnv) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_host_types(mut self, host: HostTypes) -> Self {
        self.host = host;
        self
    }

    pub fn with_cache(mut self, cache: Arc<CheckCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<CheckCache>> {
        self.cache.as_ref()
    }

    /// Typecheck every fragment of `doc`.
    #[instrument(level = "debug", skip_all, fields(fragments = doc.fragments.len()))]
    pub fn check(&self, doc: &Document) -> CheckedDocument {
        let ast = &doc.ast;
        let groups = fragment_groups(ast, &doc.fragments);
        let mut checker = TypeChecker::with_modules(ast, &self.modules)
            .with_options(self.config.to_options());
        let mut env = host_env(&self.host);

        for group in &groups {
            if !group.cyclic {
                env = self.check_fragment(&mut checker, doc, group.members[0], &env);
                continue;
            }

            if group.legal {
                let prebound: Vec<(String, Interface)> = group.members.iter()
                    .filter_map(|&m| annotated_typing(ast.kind(doc.fragments[m])))
                    .map(|(name, typing)| (name, Ok(typing)))
                    .collect();
                debug!(chain = ?group.chain, "checking recursive bindings");
                env = env.extend_all(prebound);
                for &member in &group.members {
                    env = checker.check_statement(doc.fragments[member], &env);
                }
            } else {
                warn!(chain = ?group.chain, "cyclic definition");
                let error = TypeError::new(ErrorKind::CyclicDefinition { chain: group.chain.clone() });
                for &member in &group.members {
                    let node = doc.fragments[member];
                    let recorded = checker.record_error(node, error.clone());
                    let bindings: Vec<(String, Interface)> = defined_names(ast.kind(node))
                        .into_iter()
                        .map(|name| (name, recorded.clone()))
                        .collect();
                    env = env.extend_all(bindings);
                }
            }
        }

        let exports = export_type(ast, &doc.fragments, checker.interfaces());
        let interfaces = checker.into_interfaces();

        let mut collector = ErrorCollector::with_max(self.config.max_errors);
        collector.extend(interfaces.errors().into_iter().map(|error| {
            if self.config.suggestions {
                error
            } else {
                TypeError { suggestions: Vec::new(), ..error }
            }
        }));
        let dropped = collector.dropped();
        let errors = collector.into_errors();
        debug!(errors = errors.len(), dropped, "document checked");

        CheckedDocument { interfaces, exports, errors, dropped, groups }
    }

    fn check_fragment(
        &self,
        checker: &mut TypeChecker<'_>,
        doc: &Document,
        index: usize,
        env: &TypeEnv,
    ) -> TypeEnv {
        let node = doc.fragments[index];
        let Some(cache) = &self.cache else {
            return checker.check_statement(node, env);
        };
        let options = self.config.to_options();
        let Some(key) = CacheKey::for_fragment(index, &doc.ast, node, env, &self.modules, options) else {
            return checker.check_statement(node, env);
        };

        if let Some(entry) = cache.get(&key) {
            trace!(fragment = index, "replaying cached fragment");
            checker.adopt(entry.interfaces.iter().cloned());
            return env.extend_all(entry.bindings.iter().cloned());
        }

        let next = checker.check_statement(node, env);
        let interfaces = subtree(&doc.ast, node)
            .into_iter()
            .filter_map(|id| checker.interface(id).map(|interface| (id, interface.clone())))
            .collect();
        let bindings = defined_names(doc.ast.kind(node))
            .into_iter()
            .filter_map(|name| next.get(&name).cloned().map(|interface| (name, interface)))
            .collect();
        cache.insert(key, CacheEntry { interfaces, bindings });
        next
    }
}

/// The typing an annotated binding is assumed to have before its value is checked.
fn annotated_typing(kind: &NodeKind) -> Option<(String, Typing)> {
    match kind {
        NodeKind::Const { name, annotation: Some(annotation), .. } => {
            Some((name.clone(), Typing::fixed(resolve_annotation(annotation))))
        }
        NodeKind::Let { name, annotation: Some(annotation), mutability, .. } => {
            let typing = Typing::new(resolve_annotation(annotation), true).with_mutable(Some(*mutability));
            Some((name.clone(), typing))
        }
        _ => None,
    }
}

/// `Module` type of the exported bindings; `let` exports are cells.
fn export_type(ast: &Ast, fragments: &[NodeId], interfaces: &InterfaceMap) -> Type {
    let mut fields = Vec::new();
    for &fragment in fragments {
        let (name, mutability) = match ast.kind(fragment) {
            NodeKind::Const { name, exported: true, .. } => (name, None),
            NodeKind::Let { name, exported: true, mutability, .. } => (name, Some(*mutability)),
            _ => continue,
        };
        let field = match (interfaces.get(fragment), mutability) {
            (Some(Ok(typing)), None) => ModuleField::new(name.clone(), typing.ty.clone(), typing.dynamic),
            (Some(Ok(typing)), Some(mutability)) => {
                ModuleField::new(name.clone(), cell_of(mutability, typing.ty.clone()), true)
            }
            (Some(Err(error)), _) => ModuleField::new(name.clone(), Type::error(error.clone()), false),
            (None, _) => continue,
        };
        fields.push(field);
    }
    Type::Module(fields)
}

/// Checking results of one document. Plain data; can move between threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckedDocument {
    pub interfaces: InterfaceMap,
    /// `Module` type other documents import from
    pub exports: Type,
    /// Diagnostics in source order, capped at the configured maximum
    pub errors: Vec<TypeError>,
    /// Diagnostics past the cap
    pub dropped: usize,
    pub groups: Vec<FragmentGroup>,
}

impl CheckedDocument {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.dropped > 0
    }

    pub fn interface(&self, node: NodeId) -> Option<&Interface> {
        self.interfaces.get(node)
    }

    /// Evaluate `doc` on top of `prelude`. Dynamic fragments come back as signals.
    #[instrument(level = "debug", skip_all, fields(fragments = doc.fragments.len()))]
    pub fn evaluate(
        &self,
        doc: &Document,
        prelude: &Prelude,
        modules: Rc<ModuleValueEnv>,
        options: EvalOptions,
        write_back: Option<WriteBack>,
    ) -> Result<EvaluatedDocument, EvalError> {
        let mut evaluator = Evaluator::new(Rc::new(doc.ast.clone()), Rc::new(self.interfaces.clone()))
            .with_modules(modules)
            .with_options(options);
        if let Some(write_back) = write_back {
            evaluator = evaluator.with_write_back(write_back);
        }

        let mut env = prelude.value_env();
        let mut values = vec![Value::Undefined; doc.fragments.len()];

        for group in &self.groups {
            if group.cyclic && group.legal {
                let mut references = Vec::new();
                for &member in &group.members {
                    for name in defined_names(doc.ast.kind(doc.fragments[member])) {
                        let reference = Signal::reference();
                        env = env.extend(name, Value::Signal(reference.clone()));
                        references.push((member, reference));
                    }
                }
                for &member in &group.members {
                    let (next, value) = evaluator.evaluate_statement(doc.fragments[member], &env)?;
                    env = next;
                    values[member] = value;
                }
                for (member, reference) in references {
                    let target = match &values[member] {
                        Value::Signal(signal) => signal.clone(),
                        value => Signal::ok(value.clone()),
                    };
                    reference.resolve(target)?;
                }
                continue;
            }

            for &member in &group.members {
                let (next, value) = evaluator.evaluate_statement(doc.fragments[member], &env)?;
                env = next;
                values[member] = value;
            }
        }

        let mut exports = IndexMap::new();
        for (index, &fragment) in doc.fragments.iter().enumerate() {
            if let NodeKind::Const { name, exported: true, .. } | NodeKind::Let { name, exported: true, .. } =
                doc.ast.kind(fragment)
            {
                exports.insert(name.clone(), values[index].clone());
            }
        }

        Ok(EvaluatedDocument { values, exports })
    }
}

/// Runtime values of one document.
#[derive(Debug, Clone)]
pub struct EvaluatedDocument {
    /// Value of each fragment, in document order
    pub values: Vec<Value>,
    /// Exported bindings, ready to go into a [`ModuleValueEnv`]
    pub exports: IndexMap<String, Value>,
}
