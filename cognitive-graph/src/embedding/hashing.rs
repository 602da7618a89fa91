//! Feature-hashing embedder
//!
//! Deterministic bag-of-words vectors that need no model files. Each
//! lower-cased token is hashed (BLAKE3, first eight bytes) into one of
//! `dimension` buckets with a sign bit, and the result is L2-normalised.

use super::provider::EmbeddingProvider;
use crate::error::{GraphError, Result};

/// Model-free embedding provider
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(GraphError::provider("dimension must be greater than zero"));
        }
        Ok(Self { dimension })
    }

    /// Must not vary across platforms or releases; vectors are persisted
    fn token_hash(token: &str) -> u64 {
        let digest = blake3::hash(token.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(word)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in crate::search::tokenize(text) {
            let hash = Self::token_hash(&token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_dimension_respected() {
        let embedder = HashingEmbedder::new(64).unwrap();
        assert_eq!(embedder.embed("cache eviction policy").unwrap().len(), 64);
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new(128).unwrap();
        assert_eq!(
            embedder.embed("least recently used").unwrap(),
            embedder.embed("least recently used").unwrap()
        );
    }

    #[test]
    fn test_shared_words_are_similar() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let a = embedder.embed("cache eviction policy").unwrap();
        let b = embedder.embed("eviction policy for the cache").unwrap();
        let c = embedder.embed("tokio runtime scheduler").unwrap();

        let ab = cosine_similarity(&a, &b).unwrap();
        let ac = cosine_similarity(&a, &c).unwrap();
        assert!(ab > ac);
        assert!(ab > 0.3);
    }

    #[test]
    fn test_token_hash_is_stable() {
        assert_eq!(
            HashingEmbedder::token_hash("cache"),
            HashingEmbedder::token_hash("cache")
        );
        assert_ne!(
            HashingEmbedder::token_hash("cache"),
            HashingEmbedder::token_hash("eviction")
        );
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        assert!(embedder.embed("").unwrap().iter().all(|x| *x == 0.0));
    }
}
