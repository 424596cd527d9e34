use indexmap::IndexSet;

use crate::ast::{Ast, NodeId, NodeKind};

/// Visitor over an [`Ast`] subtree. Override `visit_node` and call [`walk_node`] to recurse.
pub trait AstVisitor {
    fn visit_node(&mut self, ast: &Ast, id: NodeId) {
        walk_node(self, ast, id)
    }
}

pub fn walk_node<V: AstVisitor + ?Sized>(visitor: &mut V, ast: &Ast, id: NodeId) {
    for child in ast.children(id) {
        visitor.visit_node(ast, child);
    }
}

/// One use of a name not bound inside the walked subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub node: NodeId,
    /// The use sits inside an arrow body, so it is only read when the function runs
    pub deferred: bool,
}

#[derive(Default)]
struct ReferenceCollector {
    scopes: Vec<Vec<String>>,
    arrow_depth: usize,
    found: Vec<Reference>,
}

impl ReferenceCollector {
    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.iter().any(|n| n == name))
    }
}

impl AstVisitor for ReferenceCollector {
    fn visit_node(&mut self, ast: &Ast, id: NodeId) {
        match ast.kind(id) {
            NodeKind::Identifier { name } => {
                if !self.is_bound(name) {
                    self.found.push(Reference {
                        name: name.clone(),
                        node: id,
                        deferred: self.arrow_depth > 0,
                    });
                }
            }
            NodeKind::Arrow { params, body } => {
                self.scopes.push(params.iter().map(|p| p.name.clone()).collect());
                self.arrow_depth += 1;
                self.visit_node(ast, *body);
                self.arrow_depth -= 1;
                self.scopes.pop();
            }
            _ => walk_node(self, ast, id),
        }
    }
}

/// Every free use of a name in the subtree rooted at `id`, in source order.
pub fn references(ast: &Ast, id: NodeId) -> Vec<Reference> {
    let mut collector = ReferenceCollector::default();
    collector.visit_node(ast, id);
    collector.found
}

/// Distinct free identifiers of the subtree rooted at `id`, first use first.
pub fn free_identifiers(ast: &Ast, id: NodeId) -> IndexSet<String> {
    references(ast, id).into_iter().map(|r| r.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::{param, AstBuilder};

    #[test]
    fn test_arrow_params_are_bound() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        let y = b.ident("y");
        let sum = b.add(x, y);
        let f = b.arrow(vec![param("x", None)], sum);
        let ast = b.finish();

        let free = free_identifiers(&ast, f);
        assert_eq!(free.into_iter().collect::<Vec<_>>(), vec!["y".to_string()]);
    }

    #[test]
    fn test_deferred_references() {
        let mut b = AstBuilder::new();
        let a = b.ident("a");
        let inner = b.ident("b");
        let f = b.arrow(vec![], inner);
        let pair = b.array(vec![a, f]);
        let ast = b.finish();

        let refs = references(&ast, pair);
        assert_eq!(refs.len(), 2);
        assert!(!refs[0].deferred);
        assert!(refs[1].deferred);
    }
}
