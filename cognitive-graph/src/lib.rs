//! Cognitive Memory Graph
//!
//! In-memory knowledge graph of typed nodes and weighted edges, built as a
//! long-term memory for assistants and code tools.
//!
//! ## Features
//!
//! - **Typed nodes and edges** - concepts, entities, code, documents and free-text memories
//! - **Importance scoring** - connectivity, access frequency and recency, recomputed on every link
//! - **Capacity pruning** - low-importance nodes and low-weight edges are dropped past the limits
//! - **Ranked search** - embedding cosine or word overlap, weighted by importance and recency
//! - **Bounded traversal** - cycle-safe, depth-limited expansion along outgoing edges
//! - **Snapshots** - JSON documents on disk (or RocksDB), with periodic auto-save
//!
//! ## Example
//!
//! ```ignore
//! use cognitive_graph::{EdgeType, GraphConfig, MemoryGraphManager, Metadata, SearchOptions};
//!
//! let config = GraphConfig::default().with_data_path("memory/graph.json");
//! let manager = MemoryGraphManager::from_config(config, None)?;
//! manager.load().await;
//!
//! let caching = manager.add_concept("caching", "keep hot data close").await;
//! let eviction = manager.add_concept("eviction", "drop cold entries").await;
//! manager
//!     .add_edge(caching.id, eviction.id, EdgeType::RelatesTo, 0.8, Metadata::new())
//!     .await?;
//!
//! let hits = manager
//!     .search("eviction", &SearchOptions::default().threshold(0.3))
//!     .await;
//! manager.save().await;
//! ```

pub mod analysis;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod graph;
pub mod importance;
pub mod manager;
pub mod node;
pub mod persistence;
pub mod search;
pub mod traversal;

// Re-exports for convenience
pub use analysis::{CodeAnalysis, CodeSymbol, Dependency, IngestReport, PatternMatch, SourceLocation};
pub use config::GraphConfig;
pub use embedding::{EmbeddingProvider, HashingEmbedder, VectorEngine};
#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedProvider;
pub use error::{GraphError, Result};
pub use export::{GraphStats, VisualizationExport};
pub use graph::KnowledgeGraph;
pub use importance::PruneReport;
pub use manager::MemoryGraphManager;
pub use node::{Edge, EdgeId, EdgeType, Metadata, NewNode, Node, NodeId, NodeKind};
#[cfg(feature = "rocksdb")]
pub use persistence::RocksDbStore;
pub use persistence::{GraphSnapshot, JsonFileStore, RestoreReport, SnapshotStore};
pub use search::{SearchOptions, SearchResult};
pub use traversal::Subgraph;
