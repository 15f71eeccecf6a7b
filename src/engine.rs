//! Query orchestration.
//!
//! [`SearchEngine`] embeds the query once and delegates to the current
//! [`VectorIndex`]. The index sits behind an [`IndexHandle`] so a rebuilt or
//! reloaded index can be swapped in while queries run: each query clones the
//! `Arc` it starts with and keeps using that snapshot until it returns.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::corpus::{CorpusStore, DocumentRecord};
use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::vector::{
    DocumentId, IndexBuilder, IndexInfo, Metric, SearchHit, SearchResult, VectorIndex,
    fingerprint_ids,
};

/// Atomically replaceable reference to the serving index.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
}

impl IndexHandle {
    #[must_use]
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index serving right now. The read lock is held only for the clone.
    #[must_use]
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.current.read())
    }

    /// Installs `index` and returns the one it replaced.
    pub fn swap(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let next = Arc::new(index);
        std::mem::replace(&mut *self.current.write(), next)
    }
}

/// A hit joined with its corpus record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHit<'a> {
    pub id: DocumentId,
    pub distance: f32,
    pub document: &'a DocumentRecord,
}

/// Embeds queries and searches the current index.
///
/// `SearchEngine` is `Send + Sync`; share it as `Arc<SearchEngine>`. Queries
/// never take a lock beyond the snapshot clone, and rebuilds are serialized
/// among themselves.
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    index: IndexHandle,
    metric: Metric,
    rebuild_lock: Mutex<()>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("model", &self.embedder.model_name())
            .field("metric", &self.metric)
            .field("index", &self.index.snapshot().info())
            .finish()
    }
}

impl SearchEngine {
    /// Pairs an embedder with an index.
    ///
    /// # Errors
    /// `IndexDimensionMismatch` when the index dimension differs from the
    /// embedder's, `MetricMismatch` when the index metric is not `metric`.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: VectorIndex,
        metric: Metric,
    ) -> EngineResult<Self> {
        check_compatible(embedder.as_ref(), &index, metric)?;
        Ok(Self {
            embedder,
            index: IndexHandle::new(index),
            metric,
            rebuild_lock: Mutex::new(()),
        })
    }

    /// Returns up to `k` documents nearest to `query`, nearest first.
    ///
    /// `k` is clamped to `[1, corpus size]`; an empty index yields an empty
    /// result.
    pub fn search(&self, query: &str, k: usize) -> EngineResult<SearchResult> {
        let started = Instant::now();
        let vector = self.embedder.embed(query)?;
        let result = self.search_vector(&vector, k)?;
        tracing::debug!(
            "query of {} chars returned {} hits in {:.2?}",
            query.len(),
            result.len(),
            started.elapsed()
        );
        Ok(result)
    }

    /// Same as [`search`](Self::search) for an already embedded query.
    pub fn search_vector(&self, query: &[f32], k: usize) -> EngineResult<SearchResult> {
        let index = self.index.snapshot();
        if index.is_empty() {
            index.dimension().validate_vector(query)?;
            return Ok(SearchResult::empty());
        }
        index.search(query, k.clamp(1, index.len()))
    }

    /// Searches and joins hits with their corpus records.
    ///
    /// Hits whose id the corpus does not know are skipped.
    pub fn search_resolved<'c, C>(
        &self,
        query: &str,
        k: usize,
        corpus: &'c C,
    ) -> EngineResult<Vec<ResolvedHit<'c>>>
    where
        C: CorpusStore + ?Sized,
    {
        let result = self.search(query, k)?;
        Ok(resolve_hits(result.hits(), corpus))
    }

    /// Snapshot of the serving index.
    #[must_use]
    pub fn index(&self) -> Arc<VectorIndex> {
        self.index.snapshot()
    }

    #[must_use]
    pub fn info(&self) -> IndexInfo {
        self.index.snapshot().info()
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Installs a prepared index after the same checks as [`new`](Self::new).
    ///
    /// On error the current index keeps serving.
    pub fn replace_index(&self, index: VectorIndex) -> EngineResult<Arc<VectorIndex>> {
        check_compatible(self.embedder.as_ref(), &index, self.metric)?;
        let _guard = self.rebuild_lock.lock();
        Ok(self.swap(index))
    }

    /// Builds a new index from precomputed embeddings and swaps it in.
    pub fn rebuild<I, V>(&self, entries: I, builder: &IndexBuilder) -> EngineResult<IndexInfo>
    where
        I: IntoIterator<Item = (DocumentId, V)>,
        V: AsRef<[f32]>,
    {
        let _guard = self.rebuild_lock.lock();
        self.check_builder(builder)?;
        let index = builder
            .clone()
            .with_model(self.embedder.model_name())
            .build(entries)?;
        let info = index.info();
        self.swap(index);
        Ok(info)
    }

    /// Embeds `documents`, builds a new index and swaps it in.
    pub fn rebuild_from_corpus<F>(
        &self,
        documents: &[(DocumentId, &str)],
        builder: &IndexBuilder,
        batch_size: usize,
        progress: F,
    ) -> EngineResult<IndexInfo>
    where
        F: FnMut(usize, usize),
    {
        let _guard = self.rebuild_lock.lock();
        self.check_builder(builder)?;
        let index = build_from_corpus(
            self.embedder.as_ref(),
            documents,
            builder,
            batch_size,
            progress,
        )?;
        let info = index.info();
        self.swap(index);
        Ok(info)
    }

    /// Whether the serving index was built from exactly these ids.
    ///
    /// A mismatch is logged; the index keeps serving.
    pub fn verify_corpus(&self, ids: &[DocumentId]) -> bool {
        let index = self.index.snapshot();
        let matches = *index.corpus_fingerprint() == fingerprint_ids(ids);
        if !matches {
            tracing::warn!(
                "index was built from a different corpus ({} indexed, {} in corpus); rebuild to pick up changes",
                index.len(),
                ids.len()
            );
        }
        matches
    }

    fn check_builder(&self, builder: &IndexBuilder) -> EngineResult<()> {
        if builder.dimension() != self.embedder.dimension() {
            return Err(EngineError::IndexDimensionMismatch {
                index: builder.dimension().get(),
                embedder: self.embedder.dimension().get(),
            });
        }
        if builder.metric() != self.metric {
            return Err(EngineError::MetricMismatch {
                expected: self.metric,
                found: builder.metric(),
            });
        }
        Ok(())
    }

    fn swap(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let info = index.info();
        let previous = self.index.swap(index);
        tracing::info!(
            "now serving {} index with {} documents (was {})",
            info.variant,
            info.documents,
            previous.len()
        );
        previous
    }
}

/// Joins hits with corpus records, dropping unknown ids.
pub fn resolve_hits<'c, C>(hits: &[SearchHit], corpus: &'c C) -> Vec<ResolvedHit<'c>>
where
    C: CorpusStore + ?Sized,
{
    hits.iter()
        .filter_map(|hit| {
            let Some(document) = corpus.resolve(hit.id) else {
                tracing::debug!("skipping id {} missing from corpus", hit.id);
                return None;
            };
            Some(ResolvedHit {
                id: hit.id,
                distance: hit.distance.get(),
                document,
            })
        })
        .collect()
}

/// Embeds `(id, text)` pairs in batches and builds an index from them.
///
/// `progress` is called with `(embedded, total)` after every batch. The
/// embedder's model name is recorded in the index.
pub fn build_from_corpus<F>(
    embedder: &dyn Embedder,
    documents: &[(DocumentId, &str)],
    builder: &IndexBuilder,
    batch_size: usize,
    mut progress: F,
) -> EngineResult<VectorIndex>
where
    F: FnMut(usize, usize),
{
    if builder.dimension() != embedder.dimension() {
        return Err(EngineError::IndexDimensionMismatch {
            index: builder.dimension().get(),
            embedder: embedder.dimension().get(),
        });
    }

    let started = Instant::now();
    let total = documents.len();
    let mut entries: Vec<(DocumentId, Vec<f32>)> = Vec::with_capacity(total);

    for batch in documents.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|(_, text)| *text).collect();
        let vectors = embedder.embed_many(&texts)?;
        entries.extend(batch.iter().map(|(id, _)| *id).zip(vectors));
        progress(entries.len(), total);
    }

    tracing::debug!("embedded {total} documents in {:.2?}", started.elapsed());

    builder
        .clone()
        .with_model(embedder.model_name())
        .build(entries)
}

fn check_compatible(embedder: &dyn Embedder, index: &VectorIndex, metric: Metric) -> EngineResult<()> {
    index.ensure_dimension(embedder.dimension())?;
    index.ensure_metric(metric)?;
    if !index.model().is_empty() && index.model() != embedder.model_name() {
        tracing::warn!(
            "index was built with model '{}' but '{}' is loaded; results may be poor until the index is rebuilt",
            index.model(),
            embedder.model_name()
        );
    }
    Ok(())
}
