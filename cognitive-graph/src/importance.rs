//! Importance scoring and capacity-triggered pruning
//!
//! Importance is additive and clamped to [0, 1]:
//!
//! | term         | value                                        |
//! |--------------|----------------------------------------------|
//! | base         | 0.5                                          |
//! | connectivity | `min(degree / 20, 1) * 0.3`                  |
//! | access       | `min(accessCount / 100, 1) * 0.2`            |
//! | recency      | `max(1 - daysSinceLastAccess / 30, 0) * 0.1` |
//!
//! Pruning runs as a side effect of adds. A pass brings the count back to
//! 90% of the configured maximum, removing nodes lowest-importance first
//! (only those strictly below the prune threshold) or edges lowest-weight
//! first (no threshold).

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::graph::KnowledgeGraph;
use crate::node::{EdgeId, NodeId};

const BASE_IMPORTANCE: f32 = 0.5;
const CONNECTIVITY_WEIGHT: f32 = 0.3;
const CONNECTIVITY_SATURATION: f32 = 20.0;
const ACCESS_WEIGHT: f32 = 0.2;
const ACCESS_SATURATION: f32 = 100.0;
const RECENCY_WEIGHT: f32 = 0.1;
const RECENCY_WINDOW_DAYS: f32 = 30.0;

/// Fraction of capacity a pruning pass leaves occupied
const PRUNE_HEADROOM: f64 = 0.9;

/// Fractional days between `since` and `now`, never negative
pub fn days_between(since: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let millis = (now - since).num_milliseconds().max(0);
    millis as f32 / 86_400_000.0
}

/// Importance from connectivity, access frequency and recency
pub fn compute_importance(degree: usize, access_count: u64, days_since_access: f32) -> f32 {
    let connectivity = (degree as f32 / CONNECTIVITY_SATURATION).min(1.0) * CONNECTIVITY_WEIGHT;
    let access = (access_count as f32 / ACCESS_SATURATION).min(1.0) * ACCESS_WEIGHT;
    let recency = (1.0 - days_since_access.max(0.0) / RECENCY_WINDOW_DAYS).max(0.0) * RECENCY_WEIGHT;

    (BASE_IMPORTANCE + connectivity + access + recency).clamp(0.0, 1.0)
}

/// What a pruning pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.nodes_removed == 0 && self.edges_removed == 0
    }
}

/// Number of items to drop so that `count` falls to the headroom target
fn excess_over_target(count: usize, max: usize) -> usize {
    if count <= max {
        return 0;
    }
    let target = (max as f64 * PRUNE_HEADROOM).floor() as usize;
    count.saturating_sub(target).max(1)
}

impl KnowledgeGraph {
    /// Recompute a node's importance from its current degree and access stats
    pub fn recompute_importance(&mut self, id: &NodeId) {
        self.recompute_importance_at(id, Utc::now());
    }

    pub(crate) fn recompute_importance_at(&mut self, id: &NodeId, now: DateTime<Utc>) {
        let degree = self.degree(id);
        let Some(node) = self.node_mut(id) else {
            return;
        };

        let importance = compute_importance(
            degree,
            node.access_count,
            days_between(node.last_accessed, now),
        );
        node.set_importance(importance, now);
    }

    /// Prune nodes and edges if either count exceeds its limit
    pub fn enforce_capacity(&mut self) -> PruneReport {
        let now = Utc::now();
        let mut report = PruneReport::default();
        if self.node_count() > self.config.max_nodes {
            report = self.prune_nodes(now);
        }
        if self.edge_count() > self.config.max_edges {
            report.edges_removed += self.prune_edges(now).edges_removed;
        }
        report
    }

    /// Evict the least important nodes below the prune threshold
    pub(crate) fn prune_nodes(&mut self, now: DateTime<Utc>) -> PruneReport {
        let excess = excess_over_target(self.node_count(), self.config.max_nodes);
        if excess == 0 {
            return PruneReport::default();
        }

        let threshold = self.config.prune_threshold;
        let mut candidates: Vec<(NodeId, f32, DateTime<Utc>)> = self
            .nodes()
            .filter(|n| n.importance < threshold)
            .map(|n| (n.id, n.importance, n.last_accessed))
            .collect();

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        candidates.truncate(excess);

        let edges_before = self.edge_count();
        let mut report = PruneReport::default();
        for (id, _, _) in candidates {
            if self.remove_node_at(&id, now).is_some() {
                report.nodes_removed += 1;
            }
        }
        report.edges_removed = edges_before - self.edge_count();

        if report.nodes_removed == 0 {
            log::warn!(
                "Node count {} exceeds limit {} but no node is below prune threshold {}",
                self.node_count(),
                self.config.max_nodes,
                threshold
            );
        } else {
            log::info!(
                "Pruned {} nodes ({} edges cascaded), {} nodes remain",
                report.nodes_removed,
                report.edges_removed,
                self.node_count()
            );
        }

        report
    }

    /// Evict the lowest-weight edges
    pub(crate) fn prune_edges(&mut self, now: DateTime<Utc>) -> PruneReport {
        let excess = excess_over_target(self.edge_count(), self.config.max_edges);
        if excess == 0 {
            return PruneReport::default();
        }

        let mut candidates: Vec<(EdgeId, f32, DateTime<Utc>)> = self
            .edges()
            .map(|e| (e.id, e.weight, e.created_at))
            .collect();

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        candidates.truncate(excess);

        let mut report = PruneReport::default();
        for (id, _, _) in candidates {
            if self.remove_edge_at(&id, now).is_some() {
                report.edges_removed += 1;
            }
        }

        log::info!(
            "Pruned {} edges, {} edges remain",
            report.edges_removed,
            self.edge_count()
        );
        report
    }
}
