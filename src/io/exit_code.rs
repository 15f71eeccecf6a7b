//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed, results found
//! - `1`: General error - unspecified failure
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::EngineError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Query ran but matched nothing, or there is no index yet (code 3)
    NotFound = 3,

    /// Input could not be embedded or indexed (code 4)
    InvalidInput = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption detected (code 7)
    IndexCorrupted = 7,

    /// Index does not match the configured embedder or metric (code 8)
    IncompatibleIndex = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Exit code for a search based on result presence.
    ///
    /// Returns `Success` if anything matched, `NotFound` if empty.
    pub fn from_hit_count(hits: usize) -> Self {
        if hits > 0 {
            ExitCode::Success
        } else {
            ExitCode::NotFound
        }
    }

    /// Convert an `EngineError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &EngineError) -> Self {
        match error {
            EngineError::EmbeddingFailure { .. }
            | EngineError::DimensionMismatch { .. }
            | EngineError::DuplicateDocumentId(_)
            | EngineError::NonFiniteEmbedding(_)
            | EngineError::Corpus(_) => ExitCode::InvalidInput,

            EngineError::IndexDimensionMismatch { .. } | EngineError::MetricMismatch { .. } => {
                ExitCode::IncompatibleIndex
            }

            EngineError::CorruptIndex(_) | EngineError::UnsupportedVersion { .. } => {
                ExitCode::IndexCorrupted
            }

            EngineError::InvalidConfiguration(_) | EngineError::ModelInit { .. } => {
                ExitCode::ConfigError
            }

            EngineError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ExitCode::NotFound
            }
            EngineError::Io { .. } => ExitCode::IoError,

            EngineError::Clustering(_) => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::NotFound => "Not found",
            ExitCode::InvalidInput => "Invalid input",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
            ExitCode::IncompatibleIndex => "Index incompatible with configuration",
        }
    }
}
