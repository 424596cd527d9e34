//! Programmatic construction of document trees.
//!
//! Hosts without a parser and tests build trees here. Leaves get fresh, increasing spans and
//! composite nodes cover their children, so diagnostics sort in construction order.

use crate::ast::*;
use crate::core::interface::Mutability;
use crate::core::types::Literal;

#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
    cursor: usize,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Push a node with an explicit span.
    pub fn spanned(&mut self, span: Span, kind: NodeKind) -> NodeId {
        self.cursor = self.cursor.max(span.end + 1);
        self.ast.push(span, kind)
    }

    fn leaf(&mut self, width: usize, kind: NodeKind) -> NodeId {
        let span = Span::new(self.cursor, self.cursor + width.max(1));
        self.cursor = span.end + 1;
        self.ast.push(span, kind)
    }

    fn composite(&mut self, kind: NodeKind) -> NodeId {
        let span = kind.children()
            .into_iter()
            .map(|child| self.ast.span(child))
            .reduce(Span::cover);
        match span {
            Some(span) => self.ast.push(span, kind),
            None => self.leaf(2, kind),
        }
    }

    pub fn undefined(&mut self) -> NodeId {
        self.leaf(9, NodeKind::Undefined)
    }

    pub fn null(&mut self) -> NodeId {
        self.leaf(4, NodeKind::Null)
    }

    pub fn literal(&mut self, value: Literal) -> NodeId {
        let width = value.to_string().len();
        self.leaf(width, NodeKind::Literal { value })
    }

    pub fn num(&mut self, n: f64) -> NodeId {
        self.literal(Literal::number(n))
    }

    pub fn str(&mut self, s: &str) -> NodeId {
        self.literal(Literal::string(s))
    }

    pub fn bool(&mut self, b: bool) -> NodeId {
        self.literal(Literal::Boolean(b))
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.leaf(name.len(), NodeKind::Identifier { name: name.to_string() })
    }

    pub fn property(&mut self, key: &str, value: NodeId) -> NodeId {
        self.composite(NodeKind::Property { key: key.to_string(), value })
    }

    /// Object literal from `(key, value)` pairs; each pair becomes a property node.
    pub fn object(&mut self, properties: Vec<(&str, NodeId)>) -> NodeId {
        let properties = properties.into_iter()
            .map(|(key, value)| self.property(key, value))
            .collect();
        self.composite(NodeKind::Object { properties })
    }

    pub fn array(&mut self, elements: Vec<NodeId>) -> NodeId {
        self.composite(NodeKind::Array { elements })
    }

    pub fn unary(&mut self, op: UnaryOp, argument: NodeId) -> NodeId {
        self.composite(NodeKind::Unary { op, argument })
    }

    pub fn not(&mut self, argument: NodeId) -> NodeId {
        self.unary(UnaryOp::Not, argument)
    }

    pub fn type_of(&mut self, argument: NodeId) -> NodeId {
        self.unary(UnaryOp::Typeof, argument)
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.composite(NodeKind::Binary { op, left, right })
    }

    pub fn add(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.binary(BinaryOp::Add, left, right)
    }

    pub fn strict_eq(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.binary(BinaryOp::StrictEq, left, right)
    }

    pub fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> NodeId {
        self.composite(NodeKind::Logical { op, left, right })
    }

    pub fn and(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.logical(LogicalOp::And, left, right)
    }

    pub fn or(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.logical(LogicalOp::Or, left, right)
    }

    pub fn conditional(&mut self, test: NodeId, consequent: NodeId, alternate: NodeId) -> NodeId {
        self.composite(NodeKind::Conditional { test, consequent, alternate })
    }

    pub fn member(&mut self, object: NodeId, property: &str) -> NodeId {
        self.composite(NodeKind::Member { object, property: property.to_string() })
    }

    pub fn index(&mut self, object: NodeId, index: NodeId) -> NodeId {
        self.composite(NodeKind::Index { object, index })
    }

    pub fn call(&mut self, callee: NodeId, arguments: Vec<NodeId>) -> NodeId {
        self.composite(NodeKind::Call { callee, arguments })
    }

    pub fn arrow(&mut self, params: Vec<Param>, body: NodeId) -> NodeId {
        self.composite(NodeKind::Arrow { params, body })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.composite(NodeKind::Assignment { target, value })
    }

    pub fn element(
        &mut self,
        tag: &str,
        attributes: Vec<(&str, NodeId)>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let attributes = attributes.into_iter()
            .map(|(key, value)| self.property(key, value))
            .collect();
        self.composite(NodeKind::Element { tag: tag.to_string(), attributes, children })
    }

    pub fn as_type(&mut self, expression: NodeId, annotation: TypeAnnotation) -> NodeId {
        self.composite(NodeKind::As { expression, annotation })
    }

    pub fn const_binding(
        &mut self,
        name: &str,
        annotation: Option<TypeAnnotation>,
        value: NodeId,
    ) -> NodeId {
        self.composite(NodeKind::Const {
            name: name.to_string(),
            annotation,
            value,
            exported: false,
        })
    }

    pub fn let_binding(
        &mut self,
        name: &str,
        annotation: Option<TypeAnnotation>,
        value: NodeId,
        mutability: Mutability,
    ) -> NodeId {
        self.composite(NodeKind::Let {
            name: name.to_string(),
            annotation,
            value,
            mutability,
            exported: false,
        })
    }

    /// Mark a `const`/`let` statement as exported.
    pub fn export(&mut self, statement: NodeId) -> NodeId {
        if let Some(node) = self.ast.nodes_mut().get_mut(statement.index()) {
            if let NodeKind::Const { exported, .. } | NodeKind::Let { exported, .. } = &mut node.kind {
                *exported = true;
            }
        }
        statement
    }

    pub fn import(&mut self, module: &str, specifiers: &[(&str, &str)]) -> NodeId {
        let specifiers = specifiers.iter()
            .map(|(imported, local)| ImportSpecifier {
                imported: imported.to_string(),
                local: local.to_string(),
            })
            .collect();
        self.leaf(module.len() + 8, NodeKind::Import { module: module.to_string(), specifiers })
    }
}

/// Parameter helper: `param("x", Some(TypeAnnotation::Number))`
pub fn param(name: &str, annotation: Option<TypeAnnotation>) -> Param {
    Param { name: name.to_string(), annotation }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_span_covers_children() {
        let mut b = AstBuilder::new();
        let a = b.num(1.0);
        let c = b.num(22.0);
        let sum = b.add(a, c);
        let ast = b.finish();
        assert_eq!(ast.span(sum), ast.span(a).cover(ast.span(c)));
        assert!(ast.span(a).end < ast.span(c).start);
    }

    #[test]
    fn test_export_flag() {
        let mut b = AstBuilder::new();
        let v = b.num(1.0);
        let stmt = b.const_binding("x", None, v);
        b.export(stmt);
        let ast = b.finish();
        assert!(matches!(ast.kind(stmt), NodeKind::Const { exported: true, .. }));
    }
}
