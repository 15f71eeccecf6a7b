//! Input parsing for the line-oriented `serve` loop.
//!
//! Each request is one line on stdin: either a plain query string or a
//! JSON object `{"query": "...", "k": 5}`.

use serde::{Deserialize, Serialize};

/// One query read from the serve loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text to embed
    pub query: String,
    /// Number of results; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
        }
    }
}

/// Parse one input line into a request.
///
/// Blank lines yield `Ok(None)`. Lines starting with `{` must be a valid
/// JSON request; anything else is taken verbatim as query text.
pub fn parse_request_line(line: &str) -> Result<Option<QueryRequest>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map(Some);
    }
    Ok(Some(QueryRequest::new(trimmed)))
}
