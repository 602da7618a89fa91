//! fastembed-backed provider (AllMiniLM-L6-v2, 384 dimensions)

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::provider::EmbeddingProvider;
use crate::error::{GraphError, Result};

const MINILM_DIMENSION: usize = 384;

/// Neural sentence embeddings via ONNX Runtime
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedProvider {
    /// Load the model, downloading it into the fastembed cache on first use
    pub fn new() -> Result<Self> {
        let options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| GraphError::provider(format!("Failed to load fastembed model: {}", e)))?;

        log::info!("Loaded fastembed AllMiniLM-L6-v2 ({}d)", MINILM_DIMENSION);

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .model
            .lock()
            .embed(vec![text], None)
            .map_err(|e| GraphError::provider(format!("Failed to encode text: {}", e)))?;

        embeddings
            .pop()
            .ok_or_else(|| GraphError::provider("fastembed returned no embedding"))
    }

    fn dimension(&self) -> usize {
        MINILM_DIMENSION
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}
