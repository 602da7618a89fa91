//! Snapshot persistence
//!
//! The whole graph is written as one JSON document holding the node table,
//! the edge table and both secondary indices as `[key, [ids...]]` pairs.
//! Indices in a snapshot are advisory: loading always rebuilds them from the
//! tables and only logs when the stored copy disagrees.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::KnowledgeGraph;
use crate::node::{Edge, EdgeId, Node, NodeId, NodeKind};

/// Current snapshot document version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a [`KnowledgeGraph`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub type_index: Vec<(NodeKind, Vec<NodeId>)>,
    #[serde(default)]
    pub source_index: Vec<(NodeId, Vec<EdgeId>)>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and version-check a snapshot document
    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)
            .map_err(|e| GraphError::persistence(format!("invalid snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GraphError::persistence(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

/// What a restore did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub nodes: usize,
    pub edges: usize,
    /// Edges skipped because an endpoint was missing
    pub dropped_edges: usize,
    /// Stored indices differed from the rebuild
    pub index_mismatch: bool,
    /// Importance or weight values that had to be clamped into `[0, 1]`
    pub clamped_values: usize,
}

fn sorted_pairs<K: Ord + Copy, V: Copy>(index: &HashMap<K, BTreeSet<V>>) -> Vec<(K, Vec<V>)> {
    let mut pairs: Vec<(K, Vec<V>)> = index
        .iter()
        .map(|(k, ids)| (*k, ids.iter().copied().collect()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

fn as_index<K: Ord + Copy + std::hash::Hash, V: Ord + Copy>(
    pairs: &[(K, Vec<V>)],
) -> HashMap<K, BTreeSet<V>> {
    pairs
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(k, ids)| (*k, ids.iter().copied().collect()))
        .collect()
}

impl KnowledgeGraph {
    /// Capture the full graph, ordered for deterministic output
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<Node> = self.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut edges: Vec<Edge> = self.edges().cloned().collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            nodes,
            edges,
            type_index: sorted_pairs(&self.type_index),
            source_index: sorted_pairs(&self.source_index),
        }
    }

    /// Replace the graph contents with a snapshot, rebuilding indices
    pub fn restore(&mut self, snapshot: GraphSnapshot) -> RestoreReport {
        let stored_types = as_index(&snapshot.type_index);
        let stored_sources = as_index(&snapshot.source_index);

        let node_total = snapshot.nodes.len();
        let replaced = self.replace_contents(snapshot.nodes, snapshot.edges);

        let index_mismatch =
            stored_types != self.type_index || stored_sources != self.source_index;
        if index_mismatch {
            log::warn!("Stored indices disagree with node/edge tables; using rebuilt indices");
        }

        if replaced.clamped > 0 {
            log::warn!(
                "Snapshot contained {} importance/weight values outside [0, 1]",
                replaced.clamped
            );
        }

        let duplicate_nodes = node_total - self.node_count();
        if duplicate_nodes > 0 {
            log::warn!("Snapshot contained {} duplicate node ids", duplicate_nodes);
        }

        RestoreReport {
            nodes: self.node_count(),
            edges: self.edge_count(),
            dropped_edges: replaced.dropped_edges,
            index_mismatch,
            clamped_values: replaced.clamped,
        }
    }
}

/// Durable home for graph snapshots
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing any previous one
    fn save(&self, snapshot: &GraphSnapshot) -> Result<()>;

    /// Load the latest snapshot, `None` if nothing has been saved yet
    fn load(&self) -> Result<Option<GraphSnapshot>>;

    /// Human-readable location for logs
    fn location(&self) -> String;
}

/// Snapshot stored as a single JSON file
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash never leaves a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = snapshot.to_json()?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            GraphError::persistence(format!("cannot replace {}: {}", self.path.display(), e))
        })?;

        log::debug!(
            "Wrote snapshot ({} nodes, {} edges) to {}",
            snapshot.nodes.len(),
            snapshot.edges.len(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<GraphSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        GraphSnapshot::from_json(&raw).map(Some)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use std::path::Path;

    use rocksdb::{Options, DB};

    use super::{GraphSnapshot, SnapshotStore, SNAPSHOT_VERSION};
    use crate::error::{GraphError, Result};

    const SNAPSHOT_KEY: &[u8] = b"graph:snapshot";
    const DB_VERSION_KEY: &[u8] = b"_db_version";

    /// Snapshot stored under a single RocksDB key
    pub struct RocksDbStore {
        db: DB,
        location: String,
    }

    impl RocksDbStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            std::fs::create_dir_all(path)?;

            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

            let db = DB::open(&opts, path)?;
            log::info!("RocksDbStore opened at: {}", path.display());

            Ok(Self {
                db,
                location: path.display().to_string(),
            })
        }
    }

    impl SnapshotStore for RocksDbStore {
        fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
            self.db.put(SNAPSHOT_KEY, snapshot.to_json()?.as_bytes())?;
            self.db.put(DB_VERSION_KEY, SNAPSHOT_VERSION.to_le_bytes())?;
            self.db.flush()?;
            Ok(())
        }

        fn load(&self) -> Result<Option<GraphSnapshot>> {
            let Some(bytes) = self.db.get(SNAPSHOT_KEY)? else {
                return Ok(None);
            };
            let raw = String::from_utf8(bytes)
                .map_err(|e| GraphError::persistence(format!("snapshot is not UTF-8: {}", e)))?;
            GraphSnapshot::from_json(&raw).map(Some)
        }

        fn location(&self) -> String {
            self.location.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{EdgeType, Metadata, NewNode};

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::default();
        let a = graph
            .add_node(
                NewNode::new(NodeKind::Code, "src/lib.rs")
                    .content("pub mod graph;")
                    .meta("filePath", "src/lib.rs")
                    .meta("complexity", 3),
            )
            .id;
        let b = graph
            .add_node(NewNode::new(NodeKind::Entity, "graph").importance(0.8))
            .id;
        graph
            .add_edge(a, b, EdgeType::Contains, 1.0, Metadata::new())
            .unwrap();
        graph
    }

    #[test]
    fn test_snapshot_json_shape() {
        let graph = sample_graph();
        let json: serde_json::Value =
            serde_json::from_str(&graph.snapshot().to_json().unwrap()).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["edges"].as_array().unwrap().len(), 1);
        assert_eq!(json["edges"][0]["type"], "contains");

        let type_index = json["typeIndex"].as_array().unwrap();
        assert_eq!(type_index.len(), 2);
        assert!(type_index[0][0].is_string());
        assert!(type_index[0][1].is_array());

        let created = json["nodes"][0]["createdAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created).is_ok());
    }

    #[test]
    fn test_restore_round_trip() {
        let graph = sample_graph();
        let snapshot = GraphSnapshot::from_json(&graph.snapshot().to_json().unwrap()).unwrap();

        let mut restored = KnowledgeGraph::default();
        let report = restored.restore(snapshot);

        assert_eq!(report.nodes, 2);
        assert_eq!(report.edges, 1);
        assert_eq!(report.dropped_edges, 0);
        assert!(!report.index_mismatch);
        assert_eq!(report.clamped_values, 0);
        assert!(restored.indices_consistent());

        for node in graph.nodes() {
            assert_eq!(restored.get_node(&node.id), Some(node));
        }
        for edge in graph.edges() {
            assert_eq!(restored.get_edge(&edge.id), Some(edge));
        }
    }

    #[test]
    fn test_restore_ignores_tampered_index() {
        let graph = sample_graph();
        let mut snapshot = graph.snapshot();
        snapshot.type_index.clear();
        snapshot.source_index = vec![(NodeId::new(), vec![EdgeId::new()])];

        let mut restored = KnowledgeGraph::default();
        let report = restored.restore(snapshot);

        assert!(report.index_mismatch);
        assert!(restored.indices_consistent());
        assert_eq!(restored.type_index(), graph.type_index());
        assert_eq!(restored.source_index(), graph.source_index());
    }

    #[test]
    fn test_restore_clamps_out_of_range_scores() {
        let graph = sample_graph();
        let mut json: serde_json::Value =
            serde_json::from_str(&graph.snapshot().to_json().unwrap()).unwrap();
        json["nodes"][0]["importance"] = serde_json::json!(7.5);
        json["nodes"][1]["importance"] = serde_json::json!(-0.25);
        json["edges"][0]["weight"] = serde_json::json!(3.0);

        let snapshot = GraphSnapshot::from_json(&json.to_string()).unwrap();
        let mut restored = KnowledgeGraph::default();
        let report = restored.restore(snapshot);

        assert_eq!(report.clamped_values, 3);
        assert_eq!(report.nodes, 2);
        let mut importances: Vec<f32> = restored.nodes().map(|n| n.importance).collect();
        importances.sort_by(f32::total_cmp);
        assert_eq!(importances, vec![0.0, 1.0]);
        assert!(restored.edges().all(|e| e.weight == 1.0));
        assert!(restored.indices_consistent());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = sample_graph().snapshot();
        snapshot.version = 99;
        let raw = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(
            GraphSnapshot::from_json(&raw),
            Err(GraphError::Persistence(_))
        ));
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("graph.json"));

        assert!(store.load().unwrap().is_none());

        let graph = sample_graph();
        store.save(&graph.snapshot()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);

        // Overwrite in place
        let mut graph = graph;
        graph.clear();
        store.save(&graph.snapshot()).unwrap();
        assert!(store.load().unwrap().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_json_file_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(GraphError::Persistence(_))));
    }
}
