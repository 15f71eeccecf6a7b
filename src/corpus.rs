//! Document metadata store.
//!
//! The engine never reads document content at query time; it hands back ids
//! and the caller resolves them here. [`JsonCorpus`] loads records from a JSON
//! array or a JSON-lines file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::vector::DocumentId;

/// One document as stored in the corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Body used for embedding; the title is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Any other fields, kept for display.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentRecord {
    #[must_use]
    pub fn new(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            link: None,
            text: None,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Text the document is embedded from.
    #[must_use]
    pub fn embedding_text(&self) -> &str {
        self.text.as_deref().unwrap_or(&self.title)
    }
}

/// Read-only lookup of document metadata by id.
pub trait CorpusStore: Send + Sync {
    /// Returns the record for `id`, or `None` when the store does not know it.
    fn resolve(&self, id: DocumentId) -> Option<&DocumentRecord>;

    /// Number of documents in the store.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Corpus file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// A single JSON array of records.
    Json,
    /// One JSON record per line.
    JsonLines,
}

impl CorpusFormat {
    /// Picks the format from the extension, then from the first non-blank byte.
    fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "ndjson") => Self::JsonLines,
            _ if content.trim_start().starts_with('[') => Self::Json,
            _ => Self::JsonLines,
        }
    }
}

/// In-memory corpus loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonCorpus {
    records: Vec<DocumentRecord>,
    by_id: HashMap<DocumentId, usize>,
    source: Option<PathBuf>,
}

impl JsonCorpus {
    /// Builds a corpus from records, rejecting repeated ids.
    pub fn from_records(records: Vec<DocumentRecord>) -> EngineResult<Self> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if by_id.insert(record.id, position).is_some() {
                return Err(EngineError::DuplicateDocumentId(record.id));
            }
        }
        Ok(Self {
            records,
            by_id,
            source: None,
        })
    }

    /// Loads a `.json` array or `.jsonl` file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| EngineError::io(path, source))?;
        let format = CorpusFormat::detect(path, &content);
        let mut corpus = Self::parse(&content, format)
            .map_err(|e| match e {
                EngineError::Corpus(reason) => {
                    EngineError::Corpus(format!("{}: {reason}", path.display()))
                }
                other => other,
            })?;
        corpus.source = Some(path.to_path_buf());

        tracing::debug!(
            "loaded {} documents from {} ({format:?})",
            corpus.len(),
            path.display()
        );
        Ok(corpus)
    }

    /// Parses corpus content in the given format.
    pub fn parse(content: &str, format: CorpusFormat) -> EngineResult<Self> {
        let records = match format {
            CorpusFormat::Json => serde_json::from_str::<Vec<DocumentRecord>>(content)
                .map_err(|e| EngineError::Corpus(format!("invalid JSON corpus: {e}")))?,
            CorpusFormat::JsonLines => {
                let mut records = Vec::new();
                for (number, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = serde_json::from_str(line).map_err(|e| {
                        EngineError::Corpus(format!("line {}: {e}", number + 1))
                    })?;
                    records.push(record);
                }
                records
            }
        };
        Self::from_records(records)
    }

    /// File the corpus was loaded from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Records in file order.
    #[must_use]
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    /// Ids in file order.
    #[must_use]
    pub fn ids(&self) -> Vec<DocumentId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// `(id, text)` pairs to embed, in file order.
    #[must_use]
    pub fn documents(&self) -> Vec<(DocumentId, &str)> {
        self.records
            .iter()
            .map(|r| (r.id, r.embedding_text()))
            .collect()
    }
}

impl CorpusStore for JsonCorpus {
    fn resolve(&self, id: DocumentId) -> Option<&DocumentRecord> {
        self.by_id.get(&id).map(|&position| &self.records[position])
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
