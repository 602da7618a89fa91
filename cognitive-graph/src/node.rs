//! Node and edge types
//!
//! Core records stored in the knowledge graph. Nodes and edges refer to each
//! other only through opaque ids.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open key/value bag attached to nodes and edges
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Importance assigned to nodes added without an explicit value
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::GraphError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| crate::error::GraphError::InvalidId(format!("{:?}: {}", s, e)))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for graph nodes
    NodeId
}

uuid_id! {
    /// Unique identifier for graph edges
    EdgeId
}

/// What a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Concept,
    Entity,
    Relation,
    Code,
    Document,
    Memory,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        Self::Concept,
        Self::Entity,
        Self::Relation,
        Self::Code,
        Self::Document,
        Self::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Entity => "entity",
            Self::Relation => "relation",
            Self::Code => "code",
            Self::Document => "document",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown node kind: {}", s))
    }
}

/// Relationship carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    RelatesTo,
    Contains,
    DependsOn,
    SimilarTo,
    DerivedFrom,
    References,
}

impl EdgeType {
    pub const ALL: [EdgeType; 6] = [
        Self::RelatesTo,
        Self::Contains,
        Self::DependsOn,
        Self::SimilarTo,
        Self::DerivedFrom,
        Self::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatesTo => "relates_to",
            Self::Contains => "contains",
            Self::DependsOn => "depends_on",
            Self::SimilarTo => "similar_to",
            Self::DerivedFrom => "derived_from",
            Self::References => "references",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| format!("unknown edge type: {}", s))
    }
}

/// A unit of stored knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier, never reused
    pub id: NodeId,
    /// Fixed at creation
    pub kind: NodeKind,
    /// Short human-readable label
    pub name: String,
    /// Full text payload
    pub content: String,
    /// Kind-specific attributes (entityType, filePath, complexity, ...)
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Always within [0, 1]
    pub importance: f32,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Text used for embeddings and word-overlap scoring
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.name, self.content)
    }

    /// Record that this node was returned by a search
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// Set importance (clamped) and bump `updated_at` if it changed
    pub fn set_importance(&mut self, importance: f32, now: DateTime<Utc>) {
        let importance = clamp_unit(importance);
        if importance != self.importance {
            self.importance = importance;
            self.updated_at = now;
        }
    }
}

/// A directed, typed, weighted link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Within [0, 1]; lower weights are pruned first
    pub weight: f32,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// True if the node is either endpoint
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

/// Parameters for a node that has not been inserted yet
#[derive(Debug, Clone)]
pub struct NewNode {
    pub kind: NodeKind,
    pub name: String,
    pub content: String,
    pub metadata: Metadata,
    pub importance: Option<f32>,
}

impl NewNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: String::new(),
            metadata: Metadata::new(),
            importance: None,
        }
    }

    /// Set the content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Add a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace all metadata
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the starting importance (clamped to [0, 1])
    pub fn importance(mut self, importance: f32) -> Self {
        self.importance = Some(clamp_unit(importance));
        self
    }

    /// Materialize the node with fresh id and timestamps
    pub(crate) fn into_node(self, embedding: Option<Vec<f32>>, now: DateTime<Utc>) -> Node {
        Node {
            id: NodeId::new(),
            kind: self.kind,
            name: self.name,
            content: self.content,
            metadata: self.metadata,
            embedding,
            importance: self
                .importance
                .map(clamp_unit)
                .unwrap_or(DEFAULT_IMPORTANCE),
            access_count: 0,
            last_accessed: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
