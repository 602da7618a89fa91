//! Vector embedding engine
//!
//! High-level API for generating and caching embeddings.

use std::sync::Arc;

use dashmap::DashMap;

use super::provider::EmbeddingProvider;
use crate::error::{GraphError, Result};

/// Vector embedding engine with caching
///
/// Wraps any [`EmbeddingProvider`] with a DashMap cache and checks that every
/// vector has the advertised dimension.
pub struct VectorEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cache: DashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VectorEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimension = provider.dimension();
        log::info!(
            "VectorEngine ready ({}, {}d)",
            provider.name(),
            dimension
        );

        Self {
            provider,
            cache: DashMap::new(),
            dimension,
        }
    }

    /// Generate embedding with caching
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.provider.embed(text)?;
        if embedding.len() != self.dimension {
            return Err(GraphError::provider(format!(
                "{} returned {} values, expected {}",
                self.provider.name(),
                embedding.len(),
                self.dimension
            )));
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(GraphError::provider(format!(
                "{} returned non-finite values",
                self.provider.name()
            )));
        }

        self.cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Embed, logging and swallowing failures
    pub fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embed(text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                log::warn!("Embedding unavailable, using word overlap: {}", e);
                None
            }
        }
    }

    /// Get embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
