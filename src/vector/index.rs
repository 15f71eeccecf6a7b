//! The immutable vector index served to queries.
//!
//! [`VectorIndex`] wraps one of the two structures (exact flat scan or
//! partitioned) together with the provenance recorded at build time: the
//! embedding model tag and a fingerprint of the indexed id set.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};
use crate::vector::flat::{FlatIndex, VectorStore};
use crate::vector::partitioned::PartitionedIndex;
use crate::vector::types::{DocumentId, Metric, SearchResult, VectorDimension};

/// SHA-256 over a sorted id set.
pub type CorpusFingerprint = [u8; 32];

/// Computes the fingerprint of an id set, independent of input order.
#[must_use]
pub fn fingerprint_ids(ids: &[DocumentId]) -> CorpusFingerprint {
    let mut sorted: Vec<u64> = ids.iter().map(DocumentId::get).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update((sorted.len() as u64).to_le_bytes());
    for id in sorted {
        hasher.update(id.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Lowercase hex rendering of a fingerprint.
#[must_use]
pub fn fingerprint_hex(fingerprint: &CorpusFingerprint) -> String {
    fingerprint.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build-time provenance stored alongside the vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProvenance {
    /// Name of the embedding model the vectors came from.
    pub model: String,
    /// Fingerprint of the indexed id set.
    pub corpus_fingerprint: CorpusFingerprint,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IndexKind {
    Flat(FlatIndex),
    Partitioned(PartitionedIndex),
}

/// Read-only index over (DocumentId, embedding) pairs.
///
/// Built once by [`IndexBuilder`](crate::vector::IndexBuilder) or decoded
/// from a blob, then shared immutably across queries.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    kind: IndexKind,
    provenance: IndexProvenance,
}

/// Summary of an index for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub variant: &'static str,
    pub metric: Metric,
    pub dimension: usize,
    pub documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_partition: Option<usize>,
    pub model: String,
    pub corpus_fingerprint: String,
}

impl VectorIndex {
    pub(crate) fn flat(index: FlatIndex, provenance: IndexProvenance) -> Self {
        Self {
            kind: IndexKind::Flat(index),
            provenance,
        }
    }

    pub(crate) fn partitioned(index: PartitionedIndex, provenance: IndexProvenance) -> Self {
        Self {
            kind: IndexKind::Partitioned(index),
            provenance,
        }
    }

    /// An index with no documents.
    #[must_use]
    pub fn empty(dimension: VectorDimension, metric: Metric, model: impl Into<String>) -> Self {
        Self::flat(
            FlatIndex::new(metric, VectorStore::new(dimension)),
            IndexProvenance {
                model: model.into(),
                corpus_fingerprint: fingerprint_ids(&[]),
            },
        )
    }

    pub(crate) fn kind(&self) -> &IndexKind {
        &self.kind
    }

    pub(crate) fn store(&self) -> &VectorStore {
        match &self.kind {
            IndexKind::Flat(flat) => flat.store(),
            IndexKind::Partitioned(partitioned) => partitioned.store(),
        }
    }

    /// Finds the `k` stored vectors nearest to `query`, nearest first.
    ///
    /// An empty index yields an empty result for any `k`. A query whose
    /// length differs from the index dimension is rejected before any
    /// distance is computed.
    pub fn search(&self, query: &[f32], k: usize) -> EngineResult<SearchResult> {
        self.dimension()
            .validate_vector(query)
            .map_err(|_| EngineError::DimensionMismatch {
                expected: self.dimension().get(),
                actual: query.len(),
            })?;

        if self.is_empty() || k == 0 {
            return Ok(SearchResult::empty());
        }

        let hits = match &self.kind {
            IndexKind::Flat(flat) => flat.search(query, k),
            IndexKind::Partitioned(partitioned) => partitioned.search(query, k),
        };
        Ok(SearchResult::from_sorted(hits))
    }

    /// Like [`search`](Self::search), but fails with `MetricMismatch` when the
    /// caller expects a different metric than the index was built with.
    pub fn search_with_metric(
        &self,
        query: &[f32],
        k: usize,
        metric: Metric,
    ) -> EngineResult<SearchResult> {
        self.ensure_metric(metric)?;
        self.search(query, k)
    }

    /// Fails with `MetricMismatch` unless the index uses `expected`.
    pub fn ensure_metric(&self, expected: Metric) -> EngineResult<()> {
        if self.metric() != expected {
            return Err(EngineError::MetricMismatch {
                expected,
                found: self.metric(),
            });
        }
        Ok(())
    }

    /// Fails with `IndexDimensionMismatch` unless the index has `expected` dimension.
    pub fn ensure_dimension(&self, expected: VectorDimension) -> EngineResult<()> {
        if self.dimension() != expected {
            return Err(EngineError::IndexDimensionMismatch {
                index: self.dimension().get(),
                embedder: expected.get(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.store().dimension()
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        match &self.kind {
            IndexKind::Flat(flat) => flat.metric(),
            IndexKind::Partitioned(partitioned) => partitioned.metric(),
        }
    }

    /// `"flat"` or `"partitioned"`.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match &self.kind {
            IndexKind::Flat(_) => "flat",
            IndexKind::Partitioned(_) => "partitioned",
        }
    }

    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.store().row_of(id).is_some()
    }

    /// Stored embedding of a document.
    #[must_use]
    pub fn embedding(&self, id: DocumentId) -> Option<&[f32]> {
        let store = self.store();
        store.row_of(id).map(|row| store.vector(row))
    }

    /// Indexed ids in storage order.
    #[must_use]
    pub fn ids(&self) -> &[DocumentId] {
        self.store().ids()
    }

    #[must_use]
    pub fn provenance(&self) -> &IndexProvenance {
        &self.provenance
    }

    /// Embedding model the index was built with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.provenance.model
    }

    #[must_use]
    pub fn corpus_fingerprint(&self) -> &CorpusFingerprint {
        &self.provenance.corpus_fingerprint
    }

    #[must_use]
    pub fn info(&self) -> IndexInfo {
        let (partitions, probes, seed, largest_partition) = match &self.kind {
            IndexKind::Flat(_) => (None, None, None, None),
            IndexKind::Partitioned(p) => (
                Some(p.partitions()),
                Some(p.probes()),
                Some(p.seed()),
                p.partition_sizes().into_iter().max(),
            ),
        };

        IndexInfo {
            variant: self.variant_name(),
            metric: self.metric(),
            dimension: self.dimension().get(),
            documents: self.len(),
            partitions,
            probes,
            seed,
            largest_partition,
            model: self.provenance.model.clone(),
            corpus_fingerprint: fingerprint_hex(&self.provenance.corpus_fingerprint),
        }
    }
}
