//! Error types for the search engine
//!
//! One `thiserror` enum covers embedding, building, loading and querying.
//! Messages carry an actionable suggestion, and every variant maps to a stable
//! status code for JSON responses.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::vector::{ClusteringError, DocumentId, Metric, VectorError};

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The query or document text could not be embedded
    #[error("Failed to embed text: {reason}")]
    EmbeddingFailure { reason: String },

    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: Check the model name and that the model cache directory is writable"
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Document id {0} appears more than once\nSuggestion: Ids must be unique within one corpus"
    )]
    DuplicateDocumentId(DocumentId),

    #[error(
        "Embedding for document {0} contains NaN or infinite values\nSuggestion: Check the embedding model output for this document"
    )]
    NonFiniteEmbedding(DocumentId),

    /// A query or build entry has the wrong length
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Index dimension {index} does not match embedder dimension {embedder}\nSuggestion: Rebuild the index with 'docseek build --force' using the configured model"
    )]
    IndexDimensionMismatch { index: usize, embedder: usize },

    #[error(
        "Index was built with the {found} metric but {expected} is configured\nSuggestion: Rebuild the index or set index.metric = \"{found}\""
    )]
    MetricMismatch { expected: Metric, found: Metric },

    #[error("Index appears to be corrupted: {0}\nSuggestion: Rebuild it with 'docseek build --force'")]
    CorruptIndex(String),

    #[error(
        "Index format version {found} is not supported (this build reads version {supported})\nSuggestion: Rebuild the index with this version of docseek"
    )]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Partition training failed: {0}")]
    Clustering(#[from] ClusteringError),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to load corpus: {0}")]
    Corpus(String),

    /// File system errors
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::EmbeddingFailure { .. } => "EMBEDDING_FAILURE",
            Self::ModelInit { .. } => "MODEL_INIT_ERROR",
            Self::DuplicateDocumentId(_) => "DUPLICATE_DOCUMENT_ID",
            Self::NonFiniteEmbedding(_) => "NON_FINITE_EMBEDDING",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::IndexDimensionMismatch { .. } => "INDEX_DIMENSION_MISMATCH",
            Self::MetricMismatch { .. } => "METRIC_MISMATCH",
            Self::CorruptIndex(_) => "INDEX_CORRUPTED",
            Self::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::InvalidConfiguration(_) => "CONFIG_ERROR",
            Self::Corpus(_) => "CORPUS_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }

    /// Whether the error fails only the request that raised it.
    ///
    /// A serving loop answers such errors and keeps going; anything else means
    /// the engine cannot be put (or kept) in a consistent serving state.
    #[must_use]
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingFailure { .. } | Self::DimensionMismatch { .. }
        )
    }
}

impl From<VectorError> for EngineError {
    fn from(error: VectorError) -> Self {
        match error {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::UnknownMetric(_) => Self::InvalidConfiguration(error.to_string()),
            VectorError::InvalidDimension { .. } => Self::InvalidConfiguration(error.to_string()),
            VectorError::InvalidDistance { .. } => Self::EmbeddingFailure {
                reason: error.to_string(),
            },
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(
            EngineError::DuplicateDocumentId(DocumentId::new(4)).status_code(),
            "DUPLICATE_DOCUMENT_ID"
        );
        assert_eq!(
            EngineError::CorruptIndex("x".into()).status_code(),
            "INDEX_CORRUPTED"
        );
    }

    #[test]
    fn test_request_scope() {
        assert!(
            EngineError::EmbeddingFailure {
                reason: "bad".into()
            }
            .is_request_scoped()
        );
        assert!(
            !EngineError::IndexDimensionMismatch {
                index: 384,
                embedder: 768
            }
            .is_request_scoped()
        );
    }

    #[test]
    fn test_vector_error_conversion() {
        let err: EngineError = VectorError::DimensionMismatch {
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_io_error_message_names_path() {
        let err = EngineError::io(
            "/tmp/x.dskx",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/x.dskx"));
    }
}
