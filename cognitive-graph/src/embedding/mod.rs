//! Embedding providers for semantic similarity
//!
//! The graph treats embeddings as optional: every provider failure degrades
//! to word-overlap scoring.

mod engine;
mod hashing;
#[cfg(feature = "fastembed")]
mod neural;
mod provider;

pub use engine::VectorEngine;
pub use hashing::HashingEmbedder;
#[cfg(feature = "fastembed")]
pub use neural::FastEmbedProvider;
pub use provider::{cosine_similarity, EmbeddingProvider};
