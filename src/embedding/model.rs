//! fastembed-backed sentence embeddings.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::vector::VectorDimension;

/// Text used to discover a model's output dimension at load time.
const DIMENSION_PROBE: &str = "dimension probe";

/// Default batch size handed to the ONNX runtime.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Sentence-embedding model run through fastembed.
///
/// The model is loaded (and downloaded on first use) once; afterwards it is
/// only read. fastembed needs exclusive access while running inference, so
/// calls are serialized through a mutex.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    name: String,
    batch_size: usize,
}

impl std::fmt::Debug for FastEmbedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEmbedder")
            .field("model", &self.name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl FastEmbedEmbedder {
    /// Loads `AllMiniLML6V2` into the given cache directory.
    pub fn new(cache_dir: PathBuf) -> EngineResult<Self> {
        Self::with_options(EmbeddingModel::AllMiniLML6V2, cache_dir, DEFAULT_BATCH_SIZE, false)
    }

    /// Loads a specific model.
    ///
    /// # Errors
    /// Returns `ModelInit` if the model cannot be downloaded or initialized.
    pub fn with_options(
        model: EmbeddingModel,
        cache_dir: PathBuf,
        batch_size: usize,
        show_download_progress: bool,
    ) -> EngineResult<Self> {
        let name = model_to_string(&model);

        let has_cached_models = cache_dir
            .read_dir()
            .is_ok_and(|mut entries| entries.next().is_some());
        if has_cached_models {
            tracing::info!("loading embedding model {name} from {}", cache_dir.display());
        } else {
            tracing::info!("downloading embedding model {name} (first time only)");
        }

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EngineError::ModelInit {
            model: name.clone(),
            reason: e.to_string(),
        })?;

        let probe = text_model
            .embed(vec![DIMENSION_PROBE], None)
            .map_err(|e| EngineError::ModelInit {
                model: name.clone(),
                reason: format!("probe embedding failed: {e}"),
            })?;
        let actual = probe.first().map_or(0, Vec::len);
        let dimension = VectorDimension::new(actual).map_err(|e| EngineError::ModelInit {
            model: name.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!("model {name} produces {dimension}-dimensional embeddings");

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
            name,
            batch_size: batch_size.max(1),
        })
    }

    fn run(&self, texts: Vec<&str>) -> EngineResult<Vec<Vec<f32>>> {
        let expected = texts.len();
        let embeddings = self
            .model
            .lock()
            .map_err(|_| EngineError::EmbeddingFailure {
                reason: "embedding model lock is poisoned".to_string(),
            })?
            .embed(texts, Some(self.batch_size))
            .map_err(|e| EngineError::EmbeddingFailure {
                reason: e.to_string(),
            })?;

        if embeddings.len() != expected {
            return Err(EngineError::EmbeddingFailure {
                reason: format!("model returned {} embeddings for {expected} texts", embeddings.len()),
            });
        }
        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
            if embedding.iter().any(|value| !value.is_finite()) {
                return Err(EngineError::EmbeddingFailure {
                    reason: "model produced NaN or infinite values".to_string(),
                });
            }
        }
        Ok(embeddings)
    }
}

impl Embedder for FastEmbedEmbedder {
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.run(vec![text])?
            .pop()
            .ok_or_else(|| EngineError::EmbeddingFailure {
                reason: "model returned no embedding".to_string(),
            })
    }

    fn embed_many(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.to_vec())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Parses a configured model name.
///
/// Accepts the fastembed variant names, case-insensitively.
pub fn parse_embedding_model(name: &str) -> EngineResult<EmbeddingModel> {
    let model = match name.trim().to_ascii_lowercase().as_str() {
        "allminilml6v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "allminilml6v2q" => EmbeddingModel::AllMiniLML6V2Q,
        "allminilml12v2" | "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
        "bgesmallenv15" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bgebaseenv15" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "bgelargeenv15" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "multilinguale5small" => EmbeddingModel::MultilingualE5Small,
        "multilinguale5base" => EmbeddingModel::MultilingualE5Base,
        "paraphrasemlminilml12v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        "nomicembedtextv15" => EmbeddingModel::NomicEmbedTextV15,
        _ => {
            return Err(EngineError::InvalidConfiguration(format!(
                "unknown embedding model '{name}'. Supported: AllMiniLML6V2, AllMiniLML6V2Q, \
                 AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, BGELargeENV15, \
                 MultilingualE5Small, MultilingualE5Base, ParaphraseMLMiniLML12V2, NomicEmbedTextV15"
            )));
        }
    };
    Ok(model)
}

/// Stable name of a model, as recorded in index headers.
#[must_use]
pub fn model_to_string(model: &EmbeddingModel) -> String {
    format!("{model:?}")
}
