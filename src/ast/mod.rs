//! Document syntax trees
//!
//! Documents arrive already parsed, as an arena of [`Node`]s addressed by [`NodeId`]. Every
//! analysis result is keyed by arena index, so a tree is immutable once built.

pub mod builder;
pub mod visitor;

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::interface::Mutability;
use crate::core::types::Literal;

pub use builder::AstBuilder;
pub use visitor::{AstVisitor, walk_node, free_identifiers, references, Reference};

/// Stable index of a node in its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte offsets into the document source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub span: Span,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::Eq | BinaryOp::Ne)
    }

    /// `!==` and `!=`
    pub fn is_negated(self) -> bool {
        matches!(self, BinaryOp::StrictNe | BinaryOp::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub annotation: Option<TypeAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpecifier {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedField {
    pub name: String,
    pub annotation: TypeAnnotation,
    #[serde(default)]
    pub optional: bool,
}

/// Source-level type syntax, resolved to [`crate::core::Type`] by the checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of")]
pub enum TypeAnnotation {
    Never,
    Unknown,
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Literal(Literal),
    Array(Box<TypeAnnotation>),
    Tuple(Vec<TypeAnnotation>),
    Object(Vec<AnnotatedField>),
    Function(Vec<TypeAnnotation>, Box<TypeAnnotation>),
    Union(Vec<TypeAnnotation>),
    Intersection(Vec<TypeAnnotation>),
    /// `Label<params>`: `Array`, `Set`, `Map`, `Code`, `Session` or an abstract label
    Reference(String, Vec<TypeAnnotation>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum NodeKind {
    // Expressions
    Undefined,
    Null,
    Literal { value: Literal },
    Identifier { name: String },
    Object { properties: Vec<NodeId> },
    Property { key: String, value: NodeId },
    Array { elements: Vec<NodeId> },
    Unary { op: UnaryOp, argument: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    Logical { op: LogicalOp, left: NodeId, right: NodeId },
    Conditional { test: NodeId, consequent: NodeId, alternate: NodeId },
    Member { object: NodeId, property: String },
    Index { object: NodeId, index: NodeId },
    Call { callee: NodeId, arguments: Vec<NodeId> },
    Arrow { params: Vec<Param>, body: NodeId },
    Assignment { target: NodeId, value: NodeId },
    Element { tag: String, attributes: Vec<NodeId>, children: Vec<NodeId> },
    As { expression: NodeId, annotation: TypeAnnotation },

    // Statements
    Const {
        name: String,
        #[serde(default)]
        annotation: Option<TypeAnnotation>,
        value: NodeId,
        #[serde(default)]
        exported: bool,
    },
    Let {
        name: String,
        #[serde(default)]
        annotation: Option<TypeAnnotation>,
        value: NodeId,
        mutability: Mutability,
        #[serde(default)]
        exported: bool,
    },
    Import { module: String, specifiers: Vec<ImportSpecifier> },
}

impl NodeKind {
    pub fn is_statement(&self) -> bool {
        matches!(self, NodeKind::Const { .. } | NodeKind::Let { .. } | NodeKind::Import { .. })
    }

    /// Direct sub-nodes in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Undefined
            | NodeKind::Null
            | NodeKind::Literal { .. }
            | NodeKind::Identifier { .. }
            | NodeKind::Import { .. } => vec![],
            NodeKind::Object { properties } => properties.clone(),
            NodeKind::Property { value, .. } => vec![*value],
            NodeKind::Array { elements } => elements.clone(),
            NodeKind::Unary { argument, .. } => vec![*argument],
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                vec![*left, *right]
            }
            NodeKind::Conditional { test, consequent, alternate } => {
                vec![*test, *consequent, *alternate]
            }
            NodeKind::Member { object, .. } => vec![*object],
            NodeKind::Index { object, index } => vec![*object, *index],
            NodeKind::Call { callee, arguments } => {
                let mut out = vec![*callee];
                out.extend(arguments);
                out
            }
            NodeKind::Arrow { body, .. } => vec![*body],
            NodeKind::Assignment { target, value } => vec![*target, *value],
            NodeKind::Element { attributes, children, .. } => {
                attributes.iter().chain(children).copied().collect()
            }
            NodeKind::As { expression, .. } => vec![*expression],
            NodeKind::Const { value, .. } | NodeKind::Let { value, .. } => vec![*value],
        }
    }

    /// Name bound by a `const`/`let` statement
    pub fn binding_name(&self) -> Option<&str> {
        match self {
            NodeKind::Const { name, .. } | NodeKind::Let { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Arena of nodes for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, span: Span, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node { span, kind });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Panics on an id from another arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    /// Direct sub-nodes in evaluation order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
