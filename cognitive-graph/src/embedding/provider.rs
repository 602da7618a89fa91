//! Embedding provider boundary

use crate::error::Result;

/// Turns text into a fixed-length vector
///
/// Implementations must always return vectors of length [`dimension`](Self::dimension).
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimensionality
    fn dimension(&self) -> usize;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Cosine similarity between two vectors
///
/// Returns `None` when the lengths differ so callers can fall back to another
/// signal. A zero vector has similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        Some(similarity)
    } else {
        Some(0.0)
    }
}
