//! Depth-bounded graph expansion
//!
//! Follows outgoing edges from a seed node. Every node is expanded at most
//! once per traversal, so cyclic graphs terminate and the output never
//! contains duplicate nodes. The seed itself is not part of the output.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;
use crate::node::{Edge, EdgeId, Node, NodeId};

/// Nodes and edges collected by a traversal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

impl KnowledgeGraph {
    /// Nodes reachable from `id` through at most `depth` outgoing edges
    pub fn related_nodes(&self, id: &NodeId, depth: u32) -> Subgraph {
        let mut visited = HashSet::new();
        self.related_nodes_with(id, depth, &mut visited)
    }

    /// Traverse with a caller-owned visited set
    ///
    /// Nodes already in `visited` are neither expanded nor returned, which
    /// lets several traversals share one set.
    pub fn related_nodes_with(
        &self,
        id: &NodeId,
        depth: u32,
        visited: &mut HashSet<NodeId>,
    ) -> Subgraph {
        let mut out = Subgraph::default();
        let mut collected_nodes: HashSet<NodeId> = HashSet::new();
        let mut collected_edges: HashSet<EdgeId> = HashSet::new();

        // Explicit stack instead of recursion so deep chains cannot overflow
        let mut stack: Vec<(NodeId, u32)> = vec![(*id, depth)];

        while let Some((current, remaining)) = stack.pop() {
            if remaining == 0 || !visited.insert(current) {
                continue;
            }

            let mut next = Vec::new();
            for edge in self.outgoing_edges(&current) {
                let Some(target) = self.get_node(&edge.target) else {
                    continue;
                };

                if collected_edges.insert(edge.id) {
                    out.edges.push(edge.clone());
                }

                if visited.contains(&target.id) {
                    continue;
                }
                if collected_nodes.insert(target.id) {
                    out.nodes.push(target.clone());
                }
                next.push((target.id, remaining - 1));
            }

            // Reverse so the first edge is expanded first
            stack.extend(next.into_iter().rev());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{EdgeType, Metadata, NewNode, NodeKind};
    use std::collections::BTreeSet;

    fn node(graph: &mut KnowledgeGraph, name: &str) -> NodeId {
        graph.add_node(NewNode::new(NodeKind::Concept, name)).id
    }

    fn link(graph: &mut KnowledgeGraph, a: NodeId, b: NodeId) {
        graph
            .add_edge(a, b, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();
    }

    #[test]
    fn test_cycle_terminates_without_duplicates() {
        let mut graph = KnowledgeGraph::default();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        link(&mut graph, a, b);
        link(&mut graph, b, c);
        link(&mut graph, c, a);

        let result = graph.related_nodes(&a, 5);
        let ids: BTreeSet<NodeId> = result.node_ids().into_iter().collect();
        assert_eq!(ids, [b, c].into_iter().collect());
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.edges.len(), 3);
    }

    #[test]
    fn test_depth_bounds_expansion() {
        let mut graph = KnowledgeGraph::default();
        let chain: Vec<NodeId> = (0..5).map(|i| node(&mut graph, &format!("n{}", i))).collect();
        for pair in chain.windows(2) {
            link(&mut graph, pair[0], pair[1]);
        }

        assert!(graph.related_nodes(&chain[0], 0).is_empty());
        assert_eq!(graph.related_nodes(&chain[0], 1).node_ids(), vec![chain[1]]);
        assert_eq!(
            graph.related_nodes(&chain[0], 2).node_ids(),
            vec![chain[1], chain[2]]
        );
        assert_eq!(graph.related_nodes(&chain[0], 10).nodes.len(), 4);
    }

    #[test]
    fn test_diamond_collects_shared_node_once() {
        let mut graph = KnowledgeGraph::default();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        let d = node(&mut graph, "d");
        link(&mut graph, a, b);
        link(&mut graph, a, c);
        link(&mut graph, b, d);
        link(&mut graph, c, d);

        let result = graph.related_nodes(&a, 3);
        assert_eq!(result.nodes.len(), 3);
        assert_eq!(result.edges.len(), 4);
    }

    #[test]
    fn test_follows_outgoing_only() {
        let mut graph = KnowledgeGraph::default();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        link(&mut graph, b, a);

        assert!(graph.related_nodes(&a, 3).is_empty());
        assert_eq!(graph.related_nodes(&b, 3).node_ids(), vec![a]);
    }

    #[test]
    fn test_shared_visited_set() {
        let mut graph = KnowledgeGraph::default();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        link(&mut graph, a, c);
        link(&mut graph, b, c);

        let mut visited = HashSet::new();
        let first = graph.related_nodes_with(&a, 2, &mut visited);
        let second = graph.related_nodes_with(&b, 2, &mut visited);

        assert_eq!(first.node_ids(), vec![c]);
        assert!(second.nodes.is_empty());
    }

    #[test]
    fn test_unknown_seed() {
        let graph = KnowledgeGraph::default();
        assert!(graph.related_nodes(&NodeId::new(), 3).is_empty());
    }
}
