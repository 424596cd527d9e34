//! Fragment dependency ordering.
//!
//! Fragments may reference bindings defined later in the document. The ordering pass builds a
//! def→use graph over fragments, finds strongly connected components and emits them in a
//! topological order that otherwise keeps document order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::ast::{references, Ast, NodeId, NodeKind};

/// One strongly connected component of the fragment graph, in check/evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentGroup {
    /// Fragment positions in document order
    pub members: Vec<usize>,
    /// More than one member, or a fragment that uses its own binding
    pub cyclic: bool,
    /// Cyclic, but every member is annotated and every use inside the cycle is deferred
    pub legal: bool,
    /// Names along the cycle, closed with the first one again
    pub chain: Vec<String>,
}

/// Names a top-level fragment brings into scope.
pub fn defined_names(kind: &NodeKind) -> Vec<String> {
    match kind {
        NodeKind::Const { name, .. } | NodeKind::Let { name, .. } => vec![name.clone()],
        NodeKind::Import { specifiers, .. } => specifiers.iter().map(|s| s.local.clone()).collect(),
        _ => vec![],
    }
}

fn is_annotated_binding(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Const { annotation: Some(_), .. } | NodeKind::Let { annotation: Some(_), .. }
    )
}

/// The fragment that a use of `name` in fragment `user` reads: its own binding, else the
/// nearest preceding definition, else the first following one.
fn resolve_definition(definitions: &[usize], user: usize) -> Option<usize> {
    if definitions.contains(&user) {
        return Some(user);
    }
    definitions.iter().rev().find(|&&d| d < user)
        .or_else(|| definitions.iter().find(|&&d| d > user))
        .copied()
}

/// Partition `fragments` into dependency-ordered groups.
pub fn fragment_groups(ast: &Ast, fragments: &[NodeId]) -> Vec<FragmentGroup> {
    let mut definitions: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, &fragment) in fragments.iter().enumerate() {
        for name in defined_names(ast.kind(fragment)) {
            definitions.entry(name).or_default().push(index);
        }
    }

    // (def, use) -> every use along this edge is deferred
    let mut edges: HashMap<(usize, usize), bool> = HashMap::new();
    for (user, &fragment) in fragments.iter().enumerate() {
        for reference in references(ast, fragment) {
            let Some(defs) = definitions.get(&reference.name) else {
                continue;
            };
            if let Some(def) = resolve_definition(defs, user) {
                edges.entry((def, user))
                    .and_modify(|deferred| *deferred &= reference.deferred)
                    .or_insert(reference.deferred);
            }
        }
    }

    let mut graph: DiGraph<usize, bool> = DiGraph::with_capacity(fragments.len(), edges.len());
    let nodes: Vec<NodeIndex> = (0..fragments.len()).map(|i| graph.add_node(i)).collect();
    let mut sorted_edges: Vec<_> = edges.into_iter().collect();
    sorted_edges.sort();
    for ((def, user), deferred) in sorted_edges {
        graph.add_edge(nodes[def], nodes[user], deferred);
    }

    let components = tarjan_scc(&graph);
    let mut component_of = vec![0usize; fragments.len()];
    let mut members: Vec<Vec<usize>> = Vec::with_capacity(components.len());
    for (c, component) in components.iter().enumerate() {
        let mut indices: Vec<usize> = component.iter().map(|n| graph[*n]).collect();
        indices.sort_unstable();
        for &i in &indices {
            component_of[i] = c;
        }
        members.push(indices);
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    let mut in_degree = vec![0usize; members.len()];
    let mut self_edge = vec![false; members.len()];
    let mut all_deferred = vec![true; members.len()];
    for edge in graph.edge_indices() {
        let Some((from, to)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let (a, b) = (component_of[graph[from]], component_of[graph[to]]);
        if a == b {
            if from == to {
                self_edge[a] = true;
            }
            all_deferred[a] &= graph[edge];
        } else if !successors[a].contains(&b) {
            successors[a].push(b);
            in_degree[b] += 1;
        }
    }

    // Kahn, preferring the component whose first member comes earliest in the document
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
    for (c, degree) in in_degree.iter().enumerate() {
        if *degree == 0 {
            ready.push(Reverse((members[c][0], c)));
        }
    }

    let mut groups = Vec::with_capacity(members.len());
    while let Some(Reverse((_, c))) = ready.pop() {
        for &next in &successors[c] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((members[next][0], next)));
            }
        }

        let group_members = std::mem::take(&mut members[c]);
        let cyclic = group_members.len() > 1 || self_edge[c];
        let legal = cyclic
            && all_deferred[c]
            && group_members.iter().all(|&m| is_annotated_binding(ast.kind(fragments[m])));
        let chain = if cyclic {
            let mut names: Vec<String> = group_members.iter()
                .flat_map(|&m| defined_names(ast.kind(fragments[m])))
                .collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            names
        } else {
            Vec::new()
        };
        groups.push(FragmentGroup { members: group_members, cyclic, legal, chain });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::param;
    use crate::ast::{AstBuilder, TypeAnnotation};

    fn order(groups: &[FragmentGroup]) -> Vec<usize> {
        groups.iter().flat_map(|g| g.members.iter().copied()).collect()
    }

    #[test]
    fn test_forward_reference_is_hoisted() {
        let mut b = AstBuilder::new();
        let y = b.ident("y");
        let one = b.num(1.0);
        let sum = b.add(y, one);
        let x = b.const_binding("x", None, sum);
        let two = b.num(2.0);
        let y_def = b.const_binding("y", None, two);
        let ast = b.finish();

        let groups = fragment_groups(&ast, &[x, y_def]);
        assert_eq!(order(&groups), vec![1, 0]);
        assert!(groups.iter().all(|g| !g.cyclic));
    }

    #[test]
    fn test_independent_fragments_keep_document_order() {
        let mut b = AstBuilder::new();
        let a = b.num(1.0);
        let first = b.const_binding("a", None, a);
        let c = b.num(2.0);
        let second = b.const_binding("c", None, c);
        let use_a = b.ident("a");
        let third = b.const_binding("d", None, use_a);
        let ast = b.finish();

        let groups = fragment_groups(&ast, &[first, second, third]);
        assert_eq!(order(&groups), vec![0, 1, 2]);
    }

    #[test]
    fn test_direct_cycle_is_illegal() {
        let mut b = AstBuilder::new();
        let y = b.ident("y");
        let x = b.const_binding("x", None, y);
        let x_use = b.ident("x");
        let y_def = b.const_binding("y", None, x_use);
        let ast = b.finish();

        let groups = fragment_groups(&ast, &[x, y_def]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].cyclic);
        assert!(!groups[0].legal);
        assert_eq!(groups[0].chain, vec!["x", "y", "x"]);
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let mut b = AstBuilder::new();
        let x_use = b.ident("x");
        let x = b.const_binding("x", None, x_use);
        let ast = b.finish();

        let groups = fragment_groups(&ast, &[x]);
        assert!(groups[0].cyclic);
        assert_eq!(groups[0].chain, vec!["x", "x"]);
    }

    #[test]
    fn test_annotated_deferred_cycle_is_legal() {
        let fn_type = TypeAnnotation::Function(
            vec![TypeAnnotation::Number],
            Box::new(TypeAnnotation::Number),
        );
        let mut b = AstBuilder::new();
        let g = b.ident("g");
        let n = b.ident("n");
        let call = b.call(g, vec![n]);
        let body = b.arrow(vec![param("n", Some(TypeAnnotation::Number))], call);
        let f = b.const_binding("f", Some(fn_type.clone()), body);
        let f_use = b.ident("f");
        let m = b.ident("m");
        let call = b.call(f_use, vec![m]);
        let body = b.arrow(vec![param("m", Some(TypeAnnotation::Number))], call);
        let g_def = b.const_binding("g", Some(fn_type), body);
        let ast = b.finish();

        let groups = fragment_groups(&ast, &[f, g_def]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].cyclic && groups[0].legal);
    }

    #[test]
    fn test_use_resolves_to_nearest_preceding_definition() {
        let defs = vec![0, 2, 5];
        assert_eq!(resolve_definition(&defs, 4), Some(2));
        assert_eq!(resolve_definition(&defs, 2), Some(2));
        assert_eq!(resolve_definition(&[3], 1), Some(3));
    }
}
