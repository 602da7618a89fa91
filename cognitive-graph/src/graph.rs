//! Node/edge store
//!
//! [`KnowledgeGraph`] owns the node and edge tables plus the secondary
//! indices derived from them:
//!
//! - node kind -> node ids
//! - source node id -> outgoing edge ids
//! - target node id -> incoming edge ids (internal, used for cascades and
//!   degree counts)
//!
//! All mutation goes through methods on this struct so the indices never
//! drift from the tables. Importance recomputation and pruning live in
//! [`crate::importance`], traversal in [`crate::traversal`], ranking in
//! [`crate::search`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::GraphConfig;
use crate::embedding::VectorEngine;
use crate::error::{GraphError, Result};
use crate::node::{clamp_unit, Edge, EdgeId, EdgeType, Metadata, NewNode, Node, NodeId, NodeKind};

pub(crate) type TypeIndex = HashMap<NodeKind, BTreeSet<NodeId>>;
pub(crate) type EdgeIndex = HashMap<NodeId, BTreeSet<EdgeId>>;

/// Outcome of [`KnowledgeGraph::replace_contents`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Replaced {
    pub dropped_edges: usize,
    /// Importance or weight values forced back into `[0, 1]`
    pub clamped: usize,
}

/// In-memory knowledge graph
pub struct KnowledgeGraph {
    pub(crate) config: GraphConfig,
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) edges: HashMap<EdgeId, Edge>,
    pub(crate) type_index: TypeIndex,
    pub(crate) source_index: EdgeIndex,
    pub(crate) target_index: EdgeIndex,
    pub(crate) engine: Option<Arc<VectorEngine>>,
    revision: u64,
}

impl KnowledgeGraph {
    /// Create an empty graph without embeddings
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            type_index: HashMap::new(),
            source_index: HashMap::new(),
            target_index: HashMap::new(),
            engine: None,
            revision: 0,
        }
    }

    /// Create an empty graph that embeds node text with `engine`
    pub fn with_engine(config: GraphConfig, engine: Arc<VectorEngine>) -> Self {
        let mut graph = Self::new(config);
        graph.engine = Some(engine);
        graph
    }

    /// Replace (or remove) the embedding engine
    pub fn set_engine(&mut self, engine: Option<Arc<VectorEngine>>) {
        self.engine = engine;
    }

    pub fn engine(&self) -> Option<&Arc<VectorEngine>> {
        self.engine.as_ref()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Monotonic mutation counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ==========================================
    // Nodes
    // ==========================================

    /// Insert a node, embedding its text when an engine is configured
    ///
    /// Triggers a capacity check when the node count exceeds `maxNodes`, so
    /// the returned node may already have been pruned if its importance is
    /// below the prune threshold.
    pub fn add_node(&mut self, new: NewNode) -> Node {
        self.add_node_at(new, Utc::now())
    }

    pub(crate) fn add_node_at(&mut self, new: NewNode, now: DateTime<Utc>) -> Node {
        let embedding = self.engine.as_ref().and_then(|engine| {
            let text = format!("{} {}", new.name, new.content);
            engine.try_embed(&text)
        });

        let node = new.into_node(embedding, now);
        let id = node.id;

        self.type_index.entry(node.kind).or_default().insert(id);
        self.nodes.insert(id, node.clone());
        self.bump_revision();

        log::debug!("Added {} node {} ({})", node.kind, node.name, id);

        if self.nodes.len() > self.config.max_nodes {
            self.prune_nodes(now);
            if !self.nodes.contains_key(&id) {
                log::info!(
                    "Node {} ({}) was pruned on insert: importance {} is below the prune threshold",
                    node.name,
                    id,
                    node.importance
                );
            }
        }

        node
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Remove a node and every edge touching it; unknown ids are a no-op
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.remove_node_at(id, Utc::now())
    }

    pub(crate) fn remove_node_at(&mut self, id: &NodeId, now: DateTime<Utc>) -> Option<Node> {
        let node = self.nodes.remove(id)?;

        if let Some(ids) = self.type_index.get_mut(&node.kind) {
            ids.remove(id);
            if ids.is_empty() {
                self.type_index.remove(&node.kind);
            }
        }

        let mut touching: BTreeSet<EdgeId> = BTreeSet::new();
        if let Some(out) = self.source_index.remove(id) {
            touching.extend(out);
        }
        if let Some(inc) = self.target_index.remove(id) {
            touching.extend(inc);
        }

        let mut neighbours = BTreeSet::new();
        for edge_id in touching {
            if let Some(edge) = self.detach_edge(&edge_id) {
                neighbours.insert(edge.source);
                neighbours.insert(edge.target);
            }
        }
        neighbours.remove(id);
        for neighbour in neighbours {
            self.recompute_importance_at(&neighbour, now);
        }

        self.bump_revision();
        log::debug!("Removed node {} ({})", node.name, id);
        Some(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes of a single kind, via the type index
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&Node> {
        self.type_index
            .get(&kind)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    // ==========================================
    // Edges
    // ==========================================

    /// Link two existing nodes
    ///
    /// Fails with [`GraphError::Reference`] if either endpoint is missing; the
    /// store is left untouched in that case. On success both endpoints have
    /// their importance recomputed and the edge capacity is checked.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        weight: f32,
        metadata: Metadata,
    ) -> Result<Edge> {
        self.add_edge_at(source, target, edge_type, weight, metadata, Utc::now())
    }

    pub(crate) fn add_edge_at(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        weight: f32,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Result<Edge> {
        if !self.nodes.contains_key(&source) {
            return Err(GraphError::missing_source(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(GraphError::missing_target(target));
        }

        let edge = Edge {
            id: EdgeId::new(),
            source,
            target,
            edge_type,
            weight: clamp_unit(weight),
            metadata,
            created_at: now,
        };

        self.attach_edge(edge.clone());
        self.bump_revision();

        self.recompute_importance_at(&source, now);
        if target != source {
            self.recompute_importance_at(&target, now);
        }

        if self.edges.len() > self.config.max_edges {
            self.prune_edges(now);
        }

        Ok(edge)
    }

    pub fn get_edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Remove an edge; unknown ids are a no-op
    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        self.remove_edge_at(id, Utc::now())
    }

    pub(crate) fn remove_edge_at(&mut self, id: &EdgeId, now: DateTime<Utc>) -> Option<Edge> {
        let edge = self.detach_edge(id)?;
        self.bump_revision();
        self.recompute_importance_at(&edge.source, now);
        self.recompute_importance_at(&edge.target, now);
        Some(edge)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges whose source is `id`
    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<&Edge> {
        Self::lookup(&self.source_index, &self.edges, id)
    }

    /// Edges whose target is `id`
    pub fn incoming_edges(&self, id: &NodeId) -> Vec<&Edge> {
        Self::lookup(&self.target_index, &self.edges, id)
    }

    /// Outgoing plus incoming edge count
    pub fn degree(&self, id: &NodeId) -> usize {
        let out = self.source_index.get(id).map_or(0, BTreeSet::len);
        let inc = self.target_index.get(id).map_or(0, BTreeSet::len);
        out + inc
    }

    fn lookup<'a>(index: &EdgeIndex, edges: &'a HashMap<EdgeId, Edge>, id: &NodeId) -> Vec<&'a Edge> {
        index
            .get(id)
            .map(|ids| ids.iter().filter_map(|e| edges.get(e)).collect())
            .unwrap_or_default()
    }

    fn attach_edge(&mut self, edge: Edge) {
        self.source_index
            .entry(edge.source)
            .or_default()
            .insert(edge.id);
        self.target_index
            .entry(edge.target)
            .or_default()
            .insert(edge.id);
        self.edges.insert(edge.id, edge);
    }

    /// Remove an edge from the table and both edge indices, nothing else
    fn detach_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(id)?;
        Self::unindex(&mut self.source_index, &edge.source, id);
        Self::unindex(&mut self.target_index, &edge.target, id);
        Some(edge)
    }

    fn unindex(index: &mut EdgeIndex, node: &NodeId, edge: &EdgeId) {
        if let Some(ids) = index.get_mut(node) {
            ids.remove(edge);
            if ids.is_empty() {
                index.remove(node);
            }
        }
    }

    // ==========================================
    // Whole-graph operations
    // ==========================================

    /// Drop every node and edge
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.type_index.clear();
        self.source_index.clear();
        self.target_index.clear();
        self.bump_revision();
    }

    /// Replace the tables wholesale and rebuild every index from them
    ///
    /// Edges whose endpoints are missing are dropped. Importance and weight
    /// values outside `[0, 1]` (or NaN) are clamped.
    pub(crate) fn replace_contents(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Replaced {
        let mut replaced = Replaced::default();

        self.nodes = HashMap::with_capacity(nodes.len());
        for mut node in nodes {
            let importance = clamp_unit(node.importance);
            if importance != node.importance {
                log::warn!(
                    "Node {} had importance {} outside [0, 1]; clamped to {}",
                    node.id,
                    node.importance,
                    importance
                );
                node.importance = importance;
                replaced.clamped += 1;
            }
            self.nodes.insert(node.id, node);
        }

        self.edges = HashMap::with_capacity(edges.len());
        for mut edge in edges {
            if !(self.nodes.contains_key(&edge.source) && self.nodes.contains_key(&edge.target)) {
                log::warn!(
                    "Dropping edge {} with missing endpoint ({} -> {})",
                    edge.id,
                    edge.source,
                    edge.target
                );
                replaced.dropped_edges += 1;
                continue;
            }

            let weight = clamp_unit(edge.weight);
            if weight != edge.weight {
                log::warn!(
                    "Edge {} had weight {} outside [0, 1]; clamped to {}",
                    edge.id,
                    edge.weight,
                    weight
                );
                edge.weight = weight;
                replaced.clamped += 1;
            }
            self.edges.insert(edge.id, edge);
        }

        self.rebuild_indices();
        self.bump_revision();
        replaced
    }

    /// Rebuild all secondary indices from the node and edge tables
    pub fn rebuild_indices(&mut self) {
        let (type_index, source_index, target_index) = self.fresh_indices();
        self.type_index = type_index;
        self.source_index = source_index;
        self.target_index = target_index;
    }

    pub(crate) fn fresh_indices(&self) -> (TypeIndex, EdgeIndex, EdgeIndex) {
        let mut type_index: TypeIndex = HashMap::new();
        for node in self.nodes.values() {
            type_index.entry(node.kind).or_default().insert(node.id);
        }

        let mut source_index: EdgeIndex = HashMap::new();
        let mut target_index: EdgeIndex = HashMap::new();
        for edge in self.edges.values() {
            source_index.entry(edge.source).or_default().insert(edge.id);
            target_index.entry(edge.target).or_default().insert(edge.id);
        }

        (type_index, source_index, target_index)
    }

    /// True when the live indices equal a fresh rebuild and every edge has
    /// both endpoints
    pub fn indices_consistent(&self) -> bool {
        let (type_index, source_index, target_index) = self.fresh_indices();
        let endpoints_ok = self
            .edges
            .values()
            .all(|e| self.nodes.contains_key(&e.source) && self.nodes.contains_key(&e.target));

        endpoints_ok
            && type_index == self.type_index
            && source_index == self.source_index
            && target_index == self.target_index
    }

    /// The kind -> node ids index
    pub fn type_index(&self) -> &HashMap<NodeKind, BTreeSet<NodeId>> {
        &self.type_index
    }

    /// The source node -> outgoing edge ids index
    pub fn source_index(&self) -> &HashMap<NodeId, BTreeSet<EdgeId>> {
        &self.source_index
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingEmbedder};

    fn concept(graph: &mut KnowledgeGraph, name: &str) -> NodeId {
        graph
            .add_node(NewNode::new(NodeKind::Concept, name).content(name))
            .id
    }

    #[test]
    fn test_add_node_indexes_kind() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "caching");
        let e = graph.add_node(NewNode::new(NodeKind::Entity, "Redis")).id;

        assert_eq!(graph.node_count(), 2);
        assert!(graph.type_index()[&NodeKind::Concept].contains(&a));
        assert!(graph.type_index()[&NodeKind::Entity].contains(&e));
        assert_eq!(graph.nodes_of_kind(NodeKind::Concept).len(), 1);
        assert!(graph.nodes_of_kind(NodeKind::Code).is_empty());
        assert!(graph.indices_consistent());
    }

    #[test]
    fn test_add_node_distinct_ids() {
        let mut graph = KnowledgeGraph::default();
        let ids: BTreeSet<NodeId> = (0..50)
            .map(|i| concept(&mut graph, &format!("n{}", i)))
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_add_node_without_engine_has_no_embedding() {
        let mut graph = KnowledgeGraph::default();
        let node = graph.add_node(NewNode::new(NodeKind::Memory, "note"));
        assert!(node.embedding.is_none());
    }

    #[test]
    fn test_add_node_with_engine_embeds() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(32).unwrap());
        let engine = Arc::new(VectorEngine::new(provider));
        let mut graph = KnowledgeGraph::with_engine(GraphConfig::default(), engine);

        let node = graph.add_node(NewNode::new(NodeKind::Concept, "caching"));
        assert_eq!(node.embedding.map(|v| v.len()), Some(32));
    }

    #[test]
    fn test_add_edge_updates_source_index() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let b = concept(&mut graph, "b");

        let edge = graph
            .add_edge(a, b, EdgeType::RelatesTo, 0.8, Metadata::new())
            .unwrap();

        assert!(graph.source_index()[&a].contains(&edge.id));
        assert_eq!(graph.outgoing_edges(&a).len(), 1);
        assert_eq!(graph.incoming_edges(&b).len(), 1);
        assert_eq!(graph.degree(&a), 1);
        assert_eq!(graph.degree(&b), 1);
        assert!(graph.indices_consistent());
    }

    #[test]
    fn test_add_edge_missing_endpoint_is_reference_error() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let ghost = NodeId::new();
        let revision = graph.revision();

        let err = graph
            .add_edge(ghost, a, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap_err();
        assert!(err.is_reference());

        let err = graph
            .add_edge(a, ghost, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::Reference {
                role: crate::error::EndpointRole::Target,
                ..
            }
        ));

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.revision(), revision);
    }

    #[test]
    fn test_edge_weight_clamped() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let b = concept(&mut graph, "b");
        let edge = graph
            .add_edge(a, b, EdgeType::SimilarTo, 1.7, Metadata::new())
            .unwrap();
        assert_eq!(edge.weight, 1.0);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let b = concept(&mut graph, "b");
        let c = concept(&mut graph, "c");
        graph
            .add_edge(a, b, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();
        graph
            .add_edge(c, a, EdgeType::DependsOn, 0.5, Metadata::new())
            .unwrap();
        graph
            .add_edge(b, c, EdgeType::Contains, 0.5, Metadata::new())
            .unwrap();

        let removed = graph.remove_node(&a).unwrap();
        assert_eq!(removed.name, "a");
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edges().all(|e| !e.touches(a)));
        assert!(graph.indices_consistent());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut graph = KnowledgeGraph::default();
        concept(&mut graph, "a");
        let revision = graph.revision();

        assert!(graph.remove_node(&NodeId::new()).is_none());
        assert!(graph.remove_edge(&EdgeId::new()).is_none());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.revision(), revision);
    }

    #[test]
    fn test_remove_edge_twice() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let b = concept(&mut graph, "b");
        let edge = graph
            .add_edge(a, b, EdgeType::References, 0.3, Metadata::new())
            .unwrap();

        assert!(graph.remove_edge(&edge.id).is_some());
        assert!(graph.remove_edge(&edge.id).is_none());
        assert!(graph.outgoing_edges(&a).is_empty());
        assert!(graph.indices_consistent());
    }

    #[test]
    fn test_self_loop() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        graph
            .add_edge(a, a, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();
        assert_eq!(graph.degree(&a), 2);

        graph.remove_node(&a);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.indices_consistent());
    }

    #[test]
    fn test_clear() {
        let mut graph = KnowledgeGraph::default();
        let a = concept(&mut graph, "a");
        let b = concept(&mut graph, "b");
        graph
            .add_edge(a, b, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();

        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.type_index().is_empty());
        assert!(graph.source_index().is_empty());
    }

    #[test]
    fn test_replace_contents_drops_dangling_edges() {
        let mut source = KnowledgeGraph::default();
        let a = concept(&mut source, "a");
        let b = concept(&mut source, "b");
        source
            .add_edge(a, b, EdgeType::RelatesTo, 0.5, Metadata::new())
            .unwrap();

        let nodes: Vec<Node> = source.nodes().filter(|n| n.id == a).cloned().collect();
        let edges: Vec<Edge> = source.edges().cloned().collect();

        let mut graph = KnowledgeGraph::default();
        let replaced = graph.replace_contents(nodes, edges);
        assert_eq!(replaced.dropped_edges, 1);
        assert_eq!(replaced.clamped, 0);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.indices_consistent());
    }
}
