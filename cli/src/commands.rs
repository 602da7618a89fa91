//! Command execution
//!
//! Each invocation loads the snapshot, runs one command against a
//! [`MemoryGraphManager`] and saves again if the command changed the graph.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cognitive_graph::{
    CodeAnalysis, EmbeddingProvider, GraphConfig, GraphError, HashingEmbedder, MemoryGraphManager,
    Metadata, NewNode, SearchOptions, SnapshotStore, VectorEngine,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::args::{
    Cli, Command, EmbeddingChoice, GlobalArgs, StorageBackend, DEFAULT_DATA_FILE,
};

/// Config file, then `COGMEM_*` variables, then command-line flags
pub fn build_config(args: &GlobalArgs) -> Result<GraphConfig> {
    let mut config = match &args.config {
        Some(path) => GraphConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GraphConfig::default(),
    }
    .with_env_overrides();

    if let Some(max_nodes) = args.max_nodes {
        config = config.with_max_nodes(max_nodes);
    }
    if let Some(max_edges) = args.max_edges {
        config = config.with_max_edges(max_edges);
    }
    if let Some(data) = &args.data {
        config = config.with_data_path(data);
    }
    if config.data_path.is_none() {
        config = config.with_data_path(DEFAULT_DATA_FILE);
    }

    config.validate()?;
    Ok(config)
}

pub fn build_engine(
    choice: EmbeddingChoice,
    dimension: usize,
) -> Result<Option<Arc<VectorEngine>>> {
    let provider: Arc<dyn EmbeddingProvider> = match choice {
        EmbeddingChoice::None => return Ok(None),
        EmbeddingChoice::Hashing => Arc::new(HashingEmbedder::new(dimension)?),
        #[cfg(feature = "fastembed")]
        EmbeddingChoice::Fastembed => Arc::new(cognitive_graph::FastEmbedProvider::new()?),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingChoice::Fastembed => {
            bail!("this build has no fastembed support; rebuild with --features fastembed")
        }
    };

    tracing::info!(
        "Using {} embeddings ({} dims)",
        provider.name(),
        provider.dimension()
    );
    Ok(Some(Arc::new(VectorEngine::new(provider))))
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(path: &Path) -> Result<Arc<dyn SnapshotStore>> {
    let store = cognitive_graph::RocksDbStore::open(path)
        .with_context(|| format!("Failed to open RocksDB at {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_path: &Path) -> Result<Arc<dyn SnapshotStore>> {
    bail!("this build has no RocksDB support; rebuild with --features rocksdb")
}

/// Manager for the configured data path and backend
pub fn build_manager(args: &GlobalArgs) -> Result<MemoryGraphManager> {
    let config = build_config(args)?;
    let engine = build_engine(args.embeddings, config.embedding_dimension)?;
    let data_path = config.data_path.clone();
    let manager = MemoryGraphManager::from_config(config, engine)?;

    Ok(match (args.backend, data_path) {
        (StorageBackend::Rocksdb, Some(path)) => manager.with_store(open_rocksdb(&path)?),
        _ => manager,
    })
}

/// Load, execute, save; returns the command output as JSON
pub async fn run(cli: Cli) -> Result<Value> {
    let manager = build_manager(&cli.global)?;

    // An unreadable snapshot must not be replaced by whatever this run saves
    manager
        .try_load()
        .await
        .context("Existing graph snapshot is unreadable; refusing to continue")?;
    let mutates = cli.command.mutates();
    let output = execute(&manager, cli.command).await?;

    if mutates && !manager.save().await {
        tracing::warn!("Graph changes were not saved");
    }
    Ok(output)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisInput {
    One(Box<CodeAnalysis>),
    Many(Vec<CodeAnalysis>),
}

fn read_analyses(path: &Path) -> Result<Vec<CodeAnalysis>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let input: AnalysisInput = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a code analysis document", path.display()))?;
    Ok(match input {
        AnalysisInput::One(analysis) => vec![*analysis],
        AnalysisInput::Many(analyses) => analyses,
    })
}

fn to_metadata(pairs: Vec<(String, Value)>) -> Metadata {
    pairs.into_iter().collect()
}

/// Run one command against an already-loaded manager
pub async fn execute(manager: &MemoryGraphManager, command: Command) -> Result<Value> {
    let output = match command {
        Command::AddNode {
            kind,
            name,
            content,
            metadata,
            importance,
        } => {
            let mut node = NewNode::new(kind, name)
                .content(content)
                .metadata(to_metadata(metadata));
            if let Some(importance) = importance {
                node = node.importance(importance);
            }
            let node = manager.add_node(node).await;
            let pruned = manager.get_node(&node.id).await.is_none();
            if pruned {
                tracing::warn!(id = %node.id, "Node was pruned on insert; graph is at capacity");
            }
            let mut value = serde_json::to_value(node)?;
            value["pruned"] = json!(pruned);
            value
        }

        Command::AddEdge {
            source,
            target,
            edge_type,
            weight,
            metadata,
        } => {
            let edge = manager
                .add_edge(source, target, edge_type, weight, to_metadata(metadata))
                .await?;
            serde_json::to_value(edge)?
        }

        Command::Get { id } => match manager.get_node(&id).await {
            Some(node) => serde_json::to_value(node)?,
            None => return Err(GraphError::not_found(id).into()),
        },

        Command::Search { query, options } => {
            let result = manager.search(&query, &SearchOptions::from(&options)).await;
            serde_json::to_value(result)?
        }

        Command::Related { id, depth } => {
            if manager.get_node(&id).await.is_none() {
                return Err(GraphError::not_found(id).into());
            }
            serde_json::to_value(manager.related_nodes(&id, depth).await)?
        }

        Command::Context { queries, options } => {
            let result = manager
                .build_context(&queries, &SearchOptions::from(&options))
                .await;
            serde_json::to_value(result)?
        }

        Command::Ingest { file } => {
            let mut reports = Vec::new();
            for analysis in read_analyses(&file)? {
                reports.push(manager.ingest_code_analysis(&analysis).await);
            }
            serde_json::to_value(reports)?
        }

        Command::Stats => serde_json::to_value(manager.stats().await)?,

        Command::Export { output } => {
            let export = manager.export_visualization().await;
            match output {
                Some(path) => {
                    let raw = serde_json::to_string_pretty(&export)?;
                    std::fs::write(&path, raw)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    json!({
                        "path": path.display().to_string(),
                        "nodes": export.nodes.len(),
                        "edges": export.edges.len(),
                    })
                }
                None => serde_json::to_value(export)?,
            }
        }

        Command::RemoveNode { id } => {
            let removed = manager.remove_node(&id).await;
            json!({ "removed": removed.is_some(), "id": id })
        }

        Command::RemoveEdge { id } => {
            let removed = manager.remove_edge(&id).await;
            json!({ "removed": removed.is_some(), "id": id })
        }

        Command::Clear => {
            manager.clear().await;
            json!({ "cleared": true })
        }
    };

    Ok(output)
}
