//! Format definitions for CLI output.
//!
//! Provides one JSON envelope for `--json` output and for every line the
//! `serve` loop writes, so scripts parse both the same way.

use crate::error::EngineError;
use crate::io::exit_code::ExitCode;
use serde::{Deserialize, Serialize};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for tool integration
    Json,
}

impl OutputFormat {
    /// Create format from JSON flag.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Check if format is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Standard JSON response format.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// Status: "success" or "error"
    pub status: String,

    /// Result code (e.g., "OK", "NOT_FOUND", "INDEX_CORRUPTED")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Actual data payload (only for success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Exit code for shell scripts
    pub exit_code: u8,

    /// Metadata (execution time, version)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

/// Response metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Version of the tool
    pub version: String,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ResponseMeta {
    #[must_use]
    pub fn timed(elapsed: std::time::Duration) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            execution_time_ms: Some(elapsed.as_millis() as u64),
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    /// Create a success response with data.
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            code: "OK".to_string(),
            message: "Operation completed successfully".to_string(),
            data: Some(data),
            exit_code: ExitCode::Success as u8,
            meta: None,
        }
    }

    /// Add metadata to the response.
    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Replace the default message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Create a generic error response.
    pub fn error(code: ExitCode, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: format!("{code:?}").to_uppercase(),
            message: message.to_string(),
            data: None,
            exit_code: code as u8,
            meta: None,
        }
    }

    /// Create an error response from EngineError.
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code().to_string(),
            message: error.to_string(),
            data: None,
            exit_code: ExitCode::from_error(error) as u8,
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }

    #[test]
    fn test_json_response_success() {
        #[derive(Serialize)]
        struct TestData {
            name: String,
            value: i32,
        }

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let response = JsonResponse::success(data);
        assert_eq!(response.status, "success");
        assert_eq!(response.code, "OK");
        assert_eq!(response.exit_code, 0);
        assert!(response.data.is_some());
    }

    #[test]
    fn test_json_response_from_error() {
        let response = JsonResponse::from_error(&EngineError::EmbeddingFailure {
            reason: "not UTF-8".into(),
        });
        assert_eq!(response.status, "error");
        assert_eq!(response.code, "EMBEDDING_FAILURE");
        assert_eq!(response.exit_code, ExitCode::InvalidInput as u8);

        let line = serde_json::to_string(&response).unwrap();
        assert!(!line.contains("\"data\""));
    }
}
