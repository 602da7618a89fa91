//! Statistics and visualization export

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;
use crate::node::{EdgeId, EdgeType, Node, NodeId, NodeKind};

const TOP_N: usize = 5;

/// Short node reference used in rankings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub importance: f32,
    pub access_count: u64,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind,
            importance: node.importance,
            access_count: node.access_count,
        }
    }
}

/// Graph statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_type: BTreeMap<EdgeType, usize>,
    pub average_importance: f32,
    /// Edges per node
    pub average_degree: f32,
    pub most_important: Vec<NodeSummary>,
    pub most_accessed: Vec<NodeSummary>,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub importance: f32,
    pub access_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub weight: f32,
}

/// Flattened graph for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationExport {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}

fn top_by<F>(nodes: &[&Node], mut key: F) -> Vec<NodeSummary>
where
    F: FnMut(&Node) -> f64,
{
    let mut ranked: Vec<&Node> = nodes.to_vec();
    ranked.sort_by(|a, b| {
        key(b)
            .total_cmp(&key(a))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.into_iter().take(TOP_N).map(NodeSummary::from).collect()
}

impl KnowledgeGraph {
    pub fn stats(&self) -> GraphStats {
        let nodes: Vec<&Node> = self.nodes().collect();

        let mut nodes_by_kind = BTreeMap::new();
        for kind in NodeKind::ALL {
            let count = self.type_index.get(&kind).map_or(0, |ids| ids.len());
            if count > 0 {
                nodes_by_kind.insert(kind, count);
            }
        }

        let mut edges_by_type = BTreeMap::new();
        for edge in self.edges() {
            *edges_by_type.entry(edge.edge_type).or_insert(0) += 1;
        }

        let (average_importance, average_degree) = if nodes.is_empty() {
            (0.0, 0.0)
        } else {
            let total: f32 = nodes.iter().map(|n| n.importance).sum();
            let count = nodes.len() as f32;
            (total / count, self.edge_count() as f32 / count)
        };

        GraphStats {
            total_nodes: nodes.len(),
            total_edges: self.edge_count(),
            nodes_by_kind,
            edges_by_type,
            average_importance,
            average_degree,
            most_important: top_by(&nodes, |n| f64::from(n.importance)),
            most_accessed: top_by(&nodes, |n| n.access_count as f64),
            revision: self.revision(),
        }
    }

    /// Nodes and edges with only the fields a renderer needs
    pub fn export_visualization(&self) -> VisualizationExport {
        let mut nodes: Vec<VisNode> = self
            .nodes()
            .map(|n| VisNode {
                id: n.id,
                label: n.name.clone(),
                kind: n.kind,
                importance: n.importance,
                access_count: n.access_count,
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<VisEdge> = self
            .edges()
            .map(|e| VisEdge {
                id: e.id,
                source: e.source,
                target: e.target,
                edge_type: e.edge_type,
                weight: e.weight,
            })
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        VisualizationExport { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Metadata, NewNode};
    use crate::search::SearchOptions;

    #[test]
    fn test_stats_empty() {
        let stats = KnowledgeGraph::default().stats();
        assert_eq!(stats.total_nodes, 0);
        assert_eq!(stats.average_importance, 0.0);
        assert!(stats.most_important.is_empty());
    }

    #[test]
    fn test_stats_counts_and_rankings() {
        let mut graph = KnowledgeGraph::default();
        let a = graph
            .add_node(NewNode::new(NodeKind::Concept, "caching").importance(0.9))
            .id;
        let b = graph
            .add_node(NewNode::new(NodeKind::Entity, "Redis").importance(0.2))
            .id;
        for i in 0..6 {
            graph.add_node(NewNode::new(NodeKind::Memory, format!("note {}", i)));
        }
        graph
            .add_edge(a, b, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();

        let options = SearchOptions::default()
            .threshold(0.01)
            .include_related(false);
        graph.search("redis", &options);

        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 8);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.nodes_by_kind[&NodeKind::Memory], 6);
        assert!(!stats.nodes_by_kind.contains_key(&NodeKind::Code));
        assert_eq!(stats.edges_by_type[&EdgeType::RelatesTo], 1);
        assert_eq!(stats.most_important.len(), 5);
        assert_eq!(stats.most_accessed[0].id, b);
        assert!((stats.average_degree - 1.0 / 8.0).abs() < 1e-6);
        assert!(stats.average_importance > 0.0 && stats.average_importance <= 1.0);
    }

    #[test]
    fn test_export_visualization_shape() {
        let mut graph = KnowledgeGraph::default();
        let a = graph.add_node(NewNode::new(NodeKind::Concept, "a")).id;
        let b = graph.add_node(NewNode::new(NodeKind::Concept, "b")).id;
        graph
            .add_edge(a, b, EdgeType::DerivedFrom, 0.4, Metadata::new())
            .unwrap();

        let export = graph.export_visualization();
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.edges.len(), 1);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["edges"][0]["type"], "derived_from");
        assert!(json["nodes"][0].get("accessCount").is_some());
        assert!(json["nodes"][0].get("label").is_some());
        assert!(json["nodes"][0].get("content").is_none());
    }
}
