//! Graph configuration
//!
//! Capacity limits, pruning threshold and persistence settings. Loaded from a
//! JSON document, then optionally overridden from `COGMEM_*` environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Default maximum resident nodes before pruning
pub const DEFAULT_MAX_NODES: usize = 10_000;
/// Default maximum resident edges before pruning
pub const DEFAULT_MAX_EDGES: usize = 50_000;
/// Nodes at or above this importance are never auto-pruned
pub const DEFAULT_PRUNE_THRESHOLD: f32 = 0.1;
/// Default embedding dimensionality
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
/// Default auto-save interval in seconds
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 60;

/// Configuration for a [`KnowledgeGraph`](crate::graph::KnowledgeGraph) and its manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphConfig {
    pub max_nodes: usize,
    pub max_edges: usize,
    pub prune_threshold: f32,
    pub embedding_dimension: usize,
    /// Periodically snapshot the graph when a store is configured
    pub auto_save: bool,
    pub save_interval_secs: u64,
    /// Snapshot location; `None` keeps the graph in memory only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            auto_save: true,
            save_interval_secs: DEFAULT_SAVE_INTERVAL_SECS,
            data_path: None,
        }
    }
}

impl GraphConfig {
    /// Read configuration from a JSON file; absent fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GraphError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            GraphError::config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COGMEM_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring unparsable {}={:?}", key, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed("COGMEM_MAX_NODES", lookup("COGMEM_MAX_NODES")) {
            self.max_nodes = v;
        }
        if let Some(v) = parsed("COGMEM_MAX_EDGES", lookup("COGMEM_MAX_EDGES")) {
            self.max_edges = v;
        }
        if let Some(v) = parsed("COGMEM_PRUNE_THRESHOLD", lookup("COGMEM_PRUNE_THRESHOLD")) {
            self.prune_threshold = v;
        }
        if let Some(v) = parsed(
            "COGMEM_SAVE_INTERVAL_SECS",
            lookup("COGMEM_SAVE_INTERVAL_SECS"),
        ) {
            self.save_interval_secs = v;
        }
        if let Some(v) = parsed("COGMEM_AUTO_SAVE", lookup("COGMEM_AUTO_SAVE")) {
            self.auto_save = v;
        }
        if let Some(path) = lookup("COGMEM_DATA_PATH").filter(|p| !p.trim().is_empty()) {
            self.data_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Reject limits the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_nodes == 0 {
            return Err(GraphError::config("maxNodes must be greater than zero"));
        }
        if self.max_edges == 0 {
            return Err(GraphError::config("maxEdges must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.prune_threshold) {
            return Err(GraphError::config(format!(
                "pruneThreshold must be within [0, 1], got {}",
                self.prune_threshold
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(GraphError::config(
                "embeddingDimension must be greater than zero",
            ));
        }
        if self.auto_save && self.save_interval_secs == 0 {
            return Err(GraphError::config(
                "saveIntervalSecs must be greater than zero when autoSave is enabled",
            ));
        }
        Ok(())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_max_edges(mut self, max_edges: usize) -> Self {
        self.max_edges = max_edges;
        self
    }

    pub fn with_prune_threshold(mut self, threshold: f32) -> Self {
        self.prune_threshold = threshold;
        self
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }
}
