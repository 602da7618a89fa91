//! Async facade over a shared [`KnowledgeGraph`]
//!
//! Every mutating call takes the write half of a `tokio::sync::RwLock`, so
//! mutations run one at a time and readers never see a half-applied change.
//! Search takes the write lock as well because it records access statistics.
//!
//! Persistence is best-effort: `save`/`load` report success as a bool and
//! log failures, the in-memory graph keeps working either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::analysis::{CodeAnalysis, IngestReport};
use crate::config::GraphConfig;
use crate::embedding::VectorEngine;
use crate::error::{GraphError, Result};
use crate::export::{GraphStats, VisualizationExport};
use crate::graph::KnowledgeGraph;
use crate::node::{Edge, EdgeId, EdgeType, Metadata, NewNode, Node, NodeId, NodeKind};
use crate::persistence::{JsonFileStore, RestoreReport, SnapshotStore};
use crate::search::{SearchOptions, SearchResult};
use crate::traversal::Subgraph;

/// Memory names are the first line of content, cut to this many chars
const MEMORY_TITLE_CHARS: usize = 60;

/// Shared handle to a knowledge graph with optional persistence
pub struct MemoryGraphManager {
    graph: Arc<RwLock<KnowledgeGraph>>,
    store: Option<Arc<dyn SnapshotStore>>,
    config: GraphConfig,
    /// Graph revision captured by the last successful save or load
    saved_revision: Arc<AtomicU64>,
    auto_save: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryGraphManager {
    /// Wrap an existing graph without persistence
    pub fn new(graph: KnowledgeGraph) -> Self {
        let config = graph.config().clone();
        let revision = graph.revision();
        Self {
            graph: Arc::new(RwLock::new(graph)),
            store: None,
            config,
            saved_revision: Arc::new(AtomicU64::new(revision)),
            auto_save: Mutex::new(None),
        }
    }

    /// Build a graph from configuration
    ///
    /// A `dataPath` in the config selects a [`JsonFileStore`] at that path.
    pub fn from_config(config: GraphConfig, engine: Option<Arc<VectorEngine>>) -> Result<Self> {
        config.validate()?;

        if let Some(engine) = &engine {
            if engine.dimension() != config.embedding_dimension {
                log::warn!(
                    "Embedding provider {} produces {} dims, config says {}",
                    engine.provider_name(),
                    engine.dimension(),
                    config.embedding_dimension
                );
            }
        }

        let store = config
            .data_path
            .clone()
            .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn SnapshotStore>);

        let mut graph = KnowledgeGraph::new(config);
        graph.set_engine(engine);

        let mut manager = Self::new(graph);
        manager.store = store;
        Ok(manager)
    }

    /// Attach a snapshot store
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<dyn SnapshotStore>> {
        self.store.as_ref()
    }

    /// The underlying lock, for callers that need several operations atomically
    pub fn graph(&self) -> &Arc<RwLock<KnowledgeGraph>> {
        &self.graph
    }

    // ==========================================
    // Nodes and edges
    // ==========================================

    pub async fn add_node(&self, node: NewNode) -> Node {
        self.graph.write().await.add_node(node)
    }

    pub async fn add_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        weight: f32,
        metadata: Metadata,
    ) -> Result<Edge> {
        self.graph
            .write()
            .await
            .add_edge(source, target, edge_type, weight, metadata)
    }

    pub async fn remove_node(&self, id: &NodeId) -> Option<Node> {
        self.graph.write().await.remove_node(id)
    }

    pub async fn remove_edge(&self, id: &EdgeId) -> Option<Edge> {
        self.graph.write().await.remove_edge(id)
    }

    pub async fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.graph.read().await.get_node(id).cloned()
    }

    pub async fn add_concept(&self, name: &str, description: &str) -> Node {
        self.add_node(NewNode::new(NodeKind::Concept, name).content(description))
            .await
    }

    pub async fn add_entity(&self, name: &str, entity_type: &str, description: &str) -> Node {
        let node = NewNode::new(NodeKind::Entity, name)
            .content(description)
            .meta("entityType", entity_type);
        self.add_node(node).await
    }

    /// Store free text; the node name is its first line
    pub async fn add_memory(&self, content: &str, metadata: Metadata) -> Node {
        let node = NewNode::new(NodeKind::Memory, memory_title(content))
            .content(content)
            .metadata(metadata);
        self.add_node(node).await
    }

    pub async fn ingest_code_analysis(&self, analysis: &CodeAnalysis) -> IngestReport {
        self.graph.write().await.ingest_code_analysis(analysis)
    }

    // ==========================================
    // Queries
    // ==========================================

    pub async fn search(&self, query: &str, options: &SearchOptions) -> SearchResult {
        self.graph.write().await.search(query, options)
    }

    pub async fn related_nodes(&self, id: &NodeId, depth: u32) -> Subgraph {
        self.graph.read().await.related_nodes(id, depth)
    }

    /// Search each query and merge, keeping the best score per node
    pub async fn build_context<I, S>(&self, queries: I, options: &SearchOptions) -> SearchResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut graph = self.graph.write().await;
        let mut context = SearchResult::default();
        for query in queries {
            context.merge(graph.search(query.as_ref(), options));
        }
        context
    }

    pub async fn stats(&self) -> GraphStats {
        self.graph.read().await.stats()
    }

    pub async fn export_visualization(&self) -> VisualizationExport {
        self.graph.read().await.export_visualization()
    }

    pub async fn clear(&self) {
        self.graph.write().await.clear();
        log::info!("Cleared knowledge graph");
    }

    // ==========================================
    // Persistence
    // ==========================================

    /// Write a snapshot now; `false` if there is no store or the write failed
    pub async fn save(&self) -> bool {
        let Some(store) = self.store.clone() else {
            log::debug!("No snapshot store configured; skipping save");
            return false;
        };
        persist(&self.graph, store, &self.saved_revision).await
    }

    /// Replace the graph with the stored snapshot
    ///
    /// Returns `false` when there is no store, nothing has been saved yet, or
    /// the snapshot cannot be read. The current graph is kept in those cases.
    pub async fn load(&self) -> bool {
        match self.try_load().await {
            Ok(report) => report.is_some(),
            Err(e) => {
                log::warn!("Failed to load snapshot: {}", e);
                false
            }
        }
    }

    /// Like [`load`](Self::load) but reports why a stored snapshot could not
    /// be read
    ///
    /// `Ok(None)` means there is no store or nothing has been saved yet.
    pub async fn try_load(&self) -> Result<Option<RestoreReport>> {
        let Some(store) = self.store.clone() else {
            return Ok(None);
        };
        let location = store.location();

        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| GraphError::persistence(format!("snapshot load task failed: {}", e)))?;
        let Some(snapshot) = loaded.map_err(|e| {
            GraphError::persistence(format!("cannot read snapshot at {}: {}", location, e))
        })?
        else {
            log::info!("No snapshot at {}; starting empty", location);
            return Ok(None);
        };

        let mut graph = self.graph.write().await;
        let report = graph.restore(snapshot);
        self.saved_revision
            .store(graph.revision(), Ordering::SeqCst);

        log::info!(
            "Loaded {} nodes and {} edges from {}",
            report.nodes,
            report.edges,
            location
        );
        Ok(Some(report))
    }

    /// True when the graph changed since the last save or load
    pub async fn is_dirty(&self) -> bool {
        self.graph.read().await.revision() != self.saved_revision.load(Ordering::SeqCst)
    }

    // ==========================================
    // Auto-save
    // ==========================================

    /// Start the periodic save task if `autoSave` is on and a store exists
    ///
    /// Must be called from within a tokio runtime. Returns whether a task is
    /// running afterwards.
    pub fn start_auto_save(&self) -> bool {
        if !self.config.auto_save {
            return false;
        }
        self.spawn_auto_save(self.config.save_interval())
    }

    fn spawn_auto_save(&self, period: Duration) -> bool {
        if period.is_zero() {
            log::warn!("Auto-save interval must be greater than zero; not starting");
            return false;
        }
        let Some(store) = self.store.clone() else {
            log::debug!("Auto-save requested without a snapshot store");
            return false;
        };

        let mut slot = self.auto_save.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Cannot start auto-save outside a tokio runtime: {}", e);
                return false;
            }
        };

        let graph = Arc::clone(&self.graph);
        let saved = Arc::clone(&self.saved_revision);

        *slot = Some(runtime.spawn(async move {
            log::info!(
                "Auto-save started (every {:?}) to {}",
                period,
                store.location()
            );
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if graph.read().await.revision() == saved.load(Ordering::SeqCst) {
                    continue;
                }
                persist(&graph, Arc::clone(&store), &saved).await;
            }
        }));
        true
    }

    pub fn stop_auto_save(&self) {
        if let Some(task) = self.auto_save.lock().take() {
            task.abort();
            log::info!("Auto-save stopped");
        }
    }

    pub fn auto_save_running(&self) -> bool {
        self.auto_save
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for MemoryGraphManager {
    fn drop(&mut self) {
        if let Some(task) = self.auto_save.get_mut().take() {
            task.abort();
        }
    }
}

/// Snapshot under the read lock, write on the blocking pool
async fn persist(
    graph: &RwLock<KnowledgeGraph>,
    store: Arc<dyn SnapshotStore>,
    saved_revision: &AtomicU64,
) -> bool {
    let (snapshot, revision) = {
        let graph = graph.read().await;
        (graph.snapshot(), graph.revision())
    };
    let (nodes, edges) = (snapshot.nodes.len(), snapshot.edges.len());
    let location = store.location();

    match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
        Ok(Ok(())) => {
            saved_revision.store(revision, Ordering::SeqCst);
            log::info!("Saved {} nodes and {} edges to {}", nodes, edges, location);
            true
        }
        Ok(Err(e)) => {
            log::warn!("Failed to save snapshot to {}: {}", location, e);
            false
        }
        Err(e) => {
            log::error!("Snapshot save task failed: {}", e);
            false
        }
    }
}

fn memory_title(content: &str) -> String {
    content
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(MEMORY_TITLE_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::GraphSnapshot;

    fn manager_with_file(dir: &tempfile::TempDir) -> MemoryGraphManager {
        let config = GraphConfig::default().with_data_path(dir.path().join("graph.json"));
        MemoryGraphManager::from_config(config, None).unwrap()
    }

    /// Store whose writes always fail
    struct BrokenStore;

    impl SnapshotStore for BrokenStore {
        fn save(&self, _snapshot: &GraphSnapshot) -> Result<()> {
            Err(GraphError::persistence("disk full"))
        }

        fn load(&self) -> Result<Option<GraphSnapshot>> {
            Err(GraphError::persistence("unreadable"))
        }

        fn location(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn test_memory_title() {
        assert_eq!(memory_title("first line\nsecond"), "first line");
        assert_eq!(memory_title(""), "");
        let long = "x".repeat(100);
        assert_eq!(memory_title(&long).chars().count(), MEMORY_TITLE_CHARS);
        // Multi-byte chars are not split
        assert_eq!(memory_title(&"é".repeat(80)).chars().count(), MEMORY_TITLE_CHARS);
    }

    #[tokio::test]
    async fn test_convenience_constructors() {
        let manager = MemoryGraphManager::new(KnowledgeGraph::default());

        let concept = manager.add_concept("caching", "keeping hot data close").await;
        assert_eq!(concept.kind, NodeKind::Concept);
        assert_eq!(concept.content, "keeping hot data close");

        let entity = manager.add_entity("Redis", "database", "in-memory store").await;
        assert_eq!(entity.metadata["entityType"], "database");

        let memory = manager
            .add_memory("Deploy notes\nrolled back at 3pm", Metadata::new())
            .await;
        assert_eq!(memory.name, "Deploy notes");
        assert_eq!(memory.kind, NodeKind::Memory);

        assert_eq!(manager.stats().await.total_nodes, 3);
    }

    #[tokio::test]
    async fn test_add_edge_reference_error() {
        let manager = MemoryGraphManager::new(KnowledgeGraph::default());
        let a = manager.add_concept("a", "").await;

        let err = manager
            .add_edge(NodeId::new(), a.id, EdgeType::RelatesTo, 0.5, Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_reference());
        assert_eq!(manager.stats().await.total_edges, 0);
    }

    #[tokio::test]
    async fn test_build_context_merges_queries() {
        let manager = MemoryGraphManager::new(KnowledgeGraph::default());
        let cache = manager.add_concept("cache", "").await;
        let eviction = manager.add_concept("eviction", "").await;
        manager
            .add_edge(cache.id, eviction.id, EdgeType::RelatesTo, 0.8, Metadata::new())
            .await
            .unwrap();

        let options = SearchOptions::default().threshold(0.3);
        let context = manager
            .build_context(["cache", "eviction", "cache"], &options)
            .await;

        assert_eq!(context.nodes.len(), 2);
        assert_eq!(context.edges.len(), 1);
        assert_eq!(context.relevance_scores.len(), 2);

        let cache_node = manager.get_node(&cache.id).await.unwrap();
        assert_eq!(cache_node.access_count, 2);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_file(&dir);

        let a = manager.add_concept("caching", "hot data").await;
        let b = manager.add_entity("Redis", "database", "").await;
        manager
            .add_edge(a.id, b.id, EdgeType::References, 0.6, Metadata::new())
            .await
            .unwrap();
        assert!(manager.is_dirty().await);
        assert!(manager.save().await);
        assert!(!manager.is_dirty().await);

        let before = manager.get_node(&a.id).await.unwrap();

        let reopened = manager_with_file(&dir);
        assert!(reopened.load().await);
        let stats = reopened.stats().await;
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(reopened.get_node(&a.id).await, Some(before));
        assert!(reopened.graph().read().await.indices_consistent());
    }

    #[tokio::test]
    async fn test_persistence_failures_are_not_fatal() {
        let manager =
            MemoryGraphManager::new(KnowledgeGraph::default()).with_store(Arc::new(BrokenStore));
        manager.add_concept("a", "").await;

        assert!(!manager.save().await);
        assert!(!manager.load().await);
        assert!(matches!(
            manager.try_load().await,
            Err(GraphError::Persistence(_))
        ));
        assert_eq!(manager.stats().await.total_nodes, 1);
        assert!(manager.is_dirty().await);
    }

    #[tokio::test]
    async fn test_load_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_file(&dir);
        assert!(!manager.load().await);
        assert!(manager.try_load().await.unwrap().is_none());

        let memory_only = MemoryGraphManager::new(KnowledgeGraph::default());
        assert!(!memory_only.save().await);
        assert!(!memory_only.load().await);
    }

    #[tokio::test]
    async fn test_auto_save_writes_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let manager = manager_with_file(&dir);

        assert!(manager.spawn_auto_save(Duration::from_millis(20)));
        assert!(manager.auto_save_running());
        manager.add_concept("persist me", "").await;

        for _ in 0..100 {
            if !manager.is_dirty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!manager.is_dirty().await);
        assert!(path.exists());

        manager.stop_auto_save();
        assert!(!manager.auto_save_running());
    }

    #[test]
    fn test_auto_save_outside_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with_file(&dir);
        tokio_test::block_on(manager.add_concept("a", ""));

        assert!(!manager.start_auto_save());
        assert!(!manager.auto_save_running());
    }

    #[tokio::test]
    async fn test_auto_save_needs_store() {
        let manager = MemoryGraphManager::new(KnowledgeGraph::default());
        assert!(!manager.start_auto_save());

        let disabled = GraphConfig::default().with_auto_save(false);
        let manager = MemoryGraphManager::from_config(disabled, None).unwrap();
        assert!(!manager.start_auto_save());
    }

    #[tokio::test]
    async fn test_auto_save_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = GraphConfig {
            save_interval_secs: 0,
            ..GraphConfig::default().with_auto_save(true)
        };
        let manager = MemoryGraphManager::new(KnowledgeGraph::new(config))
            .with_store(Arc::new(JsonFileStore::new(dir.path().join("graph.json"))));

        assert!(!manager.start_auto_save());
        assert!(!manager.auto_save_running());
        assert!(!manager.spawn_auto_save(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_clear() {
        let manager = MemoryGraphManager::new(KnowledgeGraph::default());
        manager.add_concept("a", "").await;
        manager.clear().await;
        assert_eq!(manager.stats().await.total_nodes, 0);
        assert!(manager.export_visualization().await.nodes.is_empty());
    }
}
