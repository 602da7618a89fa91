//! Error types for cognitive-graph

use thiserror::Error;

/// Which end of an edge a reference error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Source,
    Target,
}

impl std::fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Errors that can occur in the memory graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Edge endpoint does not exist in the store
    #[error("Reference error: {role} node {id} does not exist")]
    Reference { role: EndpointRole, id: String },

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Malformed node or edge identifier
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Snapshot save/load failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Embedding provider failure
    #[error("Embedding provider error: {0}")]
    Provider(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// RocksDB error
    #[cfg(feature = "rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create a reference error for a missing edge source
    pub fn missing_source(id: impl ToString) -> Self {
        Self::Reference {
            role: EndpointRole::Source,
            id: id.to_string(),
        }
    }

    /// Create a reference error for a missing edge target
    pub fn missing_target(id: impl ToString) -> Self {
        Self::Reference {
            role: EndpointRole::Target,
            id: id.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl ToString) -> Self {
        Self::NodeNotFound(id.to_string())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors rejected synchronously because they would break
    /// referential integrity.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. })
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
