//! Similarity and ranking
//!
//! Scores every resident node against a query. The raw score is the cosine
//! similarity of embeddings when both sides have one of matching length,
//! otherwise the Jaccard overlap of lower-cased word sets. The raw score is
//! then weighted by the node's importance and by `exp(-days / 30)` since its
//! last access.
//!
//! Search is not read-only: every returned node has its access count bumped
//! and `last_accessed` refreshed.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::graph::KnowledgeGraph;
use crate::importance::days_between;
use crate::node::{Edge, EdgeId, Node, NodeId, NodeKind};

/// Days for the recency multiplier to fall to 1/e
const RECENCY_DECAY_DAYS: f32 = 30.0;

/// Search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    /// Restrict to a single node kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    /// Maximum direct hits to return (default: 10)
    pub limit: usize,
    /// Minimum adjusted score (default: 0.7)
    pub threshold: f32,
    /// Expand each hit through its outgoing edges (default: true)
    pub include_related: bool,
    /// Traversal depth for related expansion (default: 2)
    pub depth: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            kind: None,
            limit: 10,
            threshold: 0.7,
            include_related: true,
            depth: 2,
        }
    }
}

impl SearchOptions {
    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn include_related(mut self, include: bool) -> Self {
        self.include_related = include;
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// Search response: direct hits first, then related nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Adjusted score for each direct hit
    pub relevance_scores: HashMap<NodeId, f32>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct hits sorted by descending score
    pub fn ranked(&self) -> Vec<(&Node, f32)> {
        let mut hits: Vec<(&Node, f32)> = self
            .nodes
            .iter()
            .filter_map(|n| self.relevance_scores.get(&n.id).map(|s| (n, *s)))
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        hits
    }

    /// Fold another result in, keeping the maximum score per node
    pub fn merge(&mut self, other: SearchResult) {
        let mut seen_nodes: HashSet<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        let mut seen_edges: HashSet<EdgeId> = self.edges.iter().map(|e| e.id).collect();

        for node in other.nodes {
            if seen_nodes.insert(node.id) {
                self.nodes.push(node);
            } else if let Some(existing) = self.nodes.iter_mut().find(|n| n.id == node.id) {
                // Later queries observe the fresher access stats
                if node.access_count > existing.access_count {
                    *existing = node;
                }
            }
        }
        for edge in other.edges {
            if seen_edges.insert(edge.id) {
                self.edges.push(edge);
            }
        }
        for (id, score) in other.relevance_scores {
            self.relevance_scores
                .entry(id)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }
}

/// Lower-cased words of `text`, split on anything that is not alphanumeric
/// or `_`
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Jaccard overlap of two word sets; 0 when both are empty
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// `exp(-days / 30)`
pub fn recency_multiplier(days_since_access: f32) -> f32 {
    (-days_since_access.max(0.0) / RECENCY_DECAY_DAYS).exp()
}

/// Raw relevance of a node to a query before importance/recency weighting
fn raw_score(
    query_words: &HashSet<String>,
    query_embedding: Option<&[f32]>,
    node: &Node,
) -> f32 {
    if let (Some(query), Some(embedding)) = (query_embedding, node.embedding.as_deref()) {
        if let Some(similarity) = cosine_similarity(query, embedding) {
            return similarity;
        }
        log::debug!(
            "Embedding dimension mismatch for node {} ({} vs {}), using word overlap",
            node.id,
            embedding.len(),
            query.len()
        );
    }

    let node_words: HashSet<String> = tokenize(&node.searchable_text()).into_iter().collect();
    jaccard_similarity(query_words, &node_words)
}

impl KnowledgeGraph {
    /// Rank nodes against `query`, optionally expanding hits into a subgraph
    pub fn search(&mut self, query: &str, options: &SearchOptions) -> SearchResult {
        self.search_at(query, options, Utc::now())
    }

    /// [`search`](Self::search) evaluated at a fixed instant
    pub fn search_at(
        &mut self,
        query: &str,
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> SearchResult {
        let mut result = SearchResult::default();
        if self.node_count() == 0 || options.limit == 0 {
            return result;
        }

        let query_words: HashSet<String> = tokenize(query).into_iter().collect();
        let query_embedding = self.engine.as_ref().and_then(|e| e.try_embed(query));

        let mut scored: Vec<(NodeId, f32)> = self
            .candidates(options.kind)
            .into_iter()
            .filter_map(|node| {
                let raw = raw_score(&query_words, query_embedding.as_deref(), node);
                let recency = recency_multiplier(days_between(node.last_accessed, now));
                let score = raw * node.importance * recency;
                (score.is_finite() && score >= options.threshold).then_some((node.id, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(options.limit);

        for (id, score) in &scored {
            if let Some(node) = self.node_mut(id) {
                node.touch(now);
                result.nodes.push(node.clone());
                result.relevance_scores.insert(*id, *score);
            }
        }
        if !scored.is_empty() {
            self.bump_revision();
        }

        if options.include_related && options.depth > 0 {
            let hits: HashSet<NodeId> = scored.iter().map(|(id, _)| *id).collect();
            let mut seen_nodes = hits.clone();
            let mut seen_edges: HashSet<EdgeId> = HashSet::new();

            for (id, _) in &scored {
                let mut visited = HashSet::new();
                let related = self.related_nodes_with(id, options.depth, &mut visited);
                for node in related.nodes {
                    if seen_nodes.insert(node.id) {
                        result.nodes.push(node);
                    }
                }
                for edge in related.edges {
                    if seen_edges.insert(edge.id) {
                        result.edges.push(edge);
                    }
                }
            }
        }

        log::debug!(
            "Search {:?}: {} hits, {} nodes, {} edges",
            query,
            scored.len(),
            result.nodes.len(),
            result.edges.len()
        );
        result
    }

    fn candidates(&self, kind: Option<NodeKind>) -> Vec<&Node> {
        match kind {
            Some(kind) => self.nodes_of_kind(kind),
            None => self.nodes().collect(),
        }
    }
}
