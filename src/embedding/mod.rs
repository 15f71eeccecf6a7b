//! Text embedding.
//!
//! An [`Embedder`] maps text to a fixed-length vector. Two backends exist:
//! [`FastEmbedEmbedder`] runs an ONNX sentence-embedding model through
//! fastembed, and [`HashEmbedder`] hashes words into buckets, which needs no
//! model download and is fully deterministic.

mod hash;
mod model;

pub use hash::HashEmbedder;
pub use model::{FastEmbedEmbedder, model_to_string, parse_embedding_model};

use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, EngineResult};
use crate::vector::VectorDimension;

/// Trait for generating vector embeddings from text.
///
/// Implementations hold read-only model state and may be shared across
/// threads; every call returns vectors of exactly [`dimension`](Self::dimension)
/// values.
pub trait Embedder: Send + Sync {
    /// Embeds a single text. Empty text yields a valid vector.
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;

    /// Embeds several texts, preserving order.
    fn embed_many(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Length of every produced vector.
    fn dimension(&self) -> VectorDimension;

    /// Identifier of the model, recorded in built indices.
    fn model_name(&self) -> &str;

    /// Embeds raw input, failing when it is not valid UTF-8.
    fn embed_bytes(&self, bytes: &[u8]) -> EngineResult<Vec<f32>> {
        let text = std::str::from_utf8(bytes).map_err(|e| EngineError::EmbeddingFailure {
            reason: format!("input is not valid UTF-8: {e}"),
        })?;
        self.embed(text)
    }
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_many(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        (**self).embed_many(texts)
    }

    fn dimension(&self) -> VectorDimension {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Embedding backends selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    FastEmbed,
    Hash,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" | "onnx" => Ok(Self::FastEmbed),
            "hash" | "hashing" => Ok(Self::Hash),
            other => Err(EngineError::InvalidConfiguration(format!(
                "unknown embedding backend '{other}' (expected 'fastembed' or 'hash')"
            ))),
        }
    }
}

/// Creates the embedder described by the `[embedding]` settings.
pub fn create_embedder(config: &EmbeddingConfig) -> EngineResult<Arc<dyn Embedder>> {
    let backend: EmbeddingBackend = config.backend.parse()?;
    tracing::debug!("creating {backend:?} embedder");

    Ok(match backend {
        EmbeddingBackend::Hash => {
            let dimension = VectorDimension::new(config.dimension)
                .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;
            Arc::new(HashEmbedder::new(dimension))
        }
        EmbeddingBackend::FastEmbed => {
            let model = parse_embedding_model(&config.model)?;
            Arc::new(FastEmbedEmbedder::with_options(
                model,
                config.models_dir(),
                config.batch_size,
                config.show_download_progress,
            )?)
        }
    })
}
