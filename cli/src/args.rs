//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cognitive_graph::{EdgeId, EdgeType, NodeId, NodeKind, SearchOptions};

/// Snapshot file used when neither `--data` nor the config names one
pub const DEFAULT_DATA_FILE: &str = "cogmem-graph.json";

#[derive(Parser, Debug)]
#[command(name = "cogmem")]
#[command(about = "Cognitive memory graph: store, link and search knowledge")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Snapshot file to load before and save after the command
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Embedding provider used for new nodes and queries
    #[arg(long, global = true, value_enum, default_value_t = EmbeddingChoice::None)]
    pub embeddings: EmbeddingChoice,

    /// Snapshot backend; `rocksdb` treats `--data` as a database directory
    #[arg(long, global = true, value_enum, default_value_t = StorageBackend::Json)]
    pub backend: StorageBackend,

    #[arg(long, global = true)]
    pub max_nodes: Option<usize>,

    #[arg(long, global = true)]
    pub max_edges: Option<usize>,

    /// Debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingChoice {
    /// Word-overlap scoring only
    #[default]
    None,
    /// Feature-hashing embeddings, no model download
    Hashing,
    /// AllMiniLM-L6-v2 via fastembed (needs the `fastembed` feature)
    Fastembed,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Single JSON file, replaced atomically
    #[default]
    Json,
    /// RocksDB directory (needs the `rocksdb` feature)
    Rocksdb,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a node
    AddNode {
        #[arg(value_parser = parse_kind)]
        kind: NodeKind,
        name: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Metadata entry as key=value; JSON values are parsed
        #[arg(long = "meta", value_parser = parse_meta)]
        metadata: Vec<(String, serde_json::Value)>,
        #[arg(long)]
        importance: Option<f32>,
    },

    /// Link two nodes
    AddEdge {
        source: NodeId,
        target: NodeId,
        #[arg(long = "type", value_parser = parse_edge_type, default_value = "relates_to")]
        edge_type: EdgeType,
        #[arg(long, default_value_t = 0.5)]
        weight: f32,
        #[arg(long = "meta", value_parser = parse_meta)]
        metadata: Vec<(String, serde_json::Value)>,
    },

    /// Print a node
    Get { id: NodeId },

    /// Ranked search
    Search {
        query: String,
        #[command(flatten)]
        options: SearchArgs,
    },

    /// Nodes reachable along outgoing edges
    Related {
        id: NodeId,
        #[arg(long, default_value_t = 2)]
        depth: u32,
    },

    /// Search several queries and merge the results
    Context {
        #[arg(required = true)]
        queries: Vec<String>,
        #[command(flatten)]
        options: SearchArgs,
    },

    /// Ingest code analysis JSON (one object or an array)
    Ingest { file: PathBuf },

    /// Graph statistics
    Stats,

    /// Flattened nodes and edges for rendering
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    RemoveNode { id: NodeId },

    RemoveEdge { id: EdgeId },

    /// Remove every node and edge
    Clear,
}

impl Command {
    /// Whether the graph should be saved afterwards
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Command::Get { .. } | Command::Related { .. } | Command::Stats | Command::Export { .. }
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<NodeKind>,
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
    #[arg(long, default_value_t = 0.7)]
    pub threshold: f32,
    /// Only direct hits, no related-node expansion
    #[arg(long)]
    pub no_related: bool,
    #[arg(long, default_value_t = 2)]
    pub depth: u32,
}

impl From<&SearchArgs> for SearchOptions {
    fn from(args: &SearchArgs) -> Self {
        let mut options = SearchOptions::default()
            .limit(args.limit)
            .threshold(args.threshold)
            .include_related(!args.no_related)
            .depth(args.depth);
        if let Some(kind) = args.kind {
            options = options.kind(kind);
        }
        options
    }
}

fn parse_kind(s: &str) -> Result<NodeKind, String> {
    s.parse()
}

fn parse_edge_type(s: &str) -> Result<EdgeType, String> {
    s.parse()
}

/// `key=value`; the value is JSON if it parses, a string otherwise
pub fn parse_meta(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in {:?}", s));
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
