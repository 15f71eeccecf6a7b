//! Exact flat index: exhaustive scan with a bounded top-k heap.
//!
//! Vectors live in one contiguous `Vec<f32>` (row-major), so a scan walks
//! memory linearly. Large stores are scanned in parallel chunks whose partial
//! heaps are merged under the same total order, which keeps parallel and
//! sequential results identical.

use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;

use crate::vector::types::{DocumentId, Metric, SearchHit, VectorDimension};

/// Minimum row count before a scan goes parallel.
const PARALLEL_THRESHOLD: usize = 10_000;

/// Rows per parallel chunk.
const PARALLEL_CHUNK_ROWS: usize = 1024;

/// Row-major storage of (DocumentId, embedding) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    dimension: VectorDimension,
    ids: Vec<DocumentId>,
    data: Vec<f32>,
    rows_by_id: HashMap<DocumentId, usize>,
}

impl VectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self::with_capacity(dimension, 0)
    }

    /// Creates an empty store with room for `rows` vectors.
    #[must_use]
    pub fn with_capacity(dimension: VectorDimension, rows: usize) -> Self {
        Self {
            dimension,
            ids: Vec::with_capacity(rows),
            data: Vec::with_capacity(rows * dimension.get()),
            rows_by_id: HashMap::with_capacity(rows),
        }
    }

    /// Appends a vector, returning `false` (and storing nothing) when the id
    /// is already present.
    ///
    /// The caller validates the vector length.
    pub(crate) fn push(&mut self, id: DocumentId, vector: &[f32]) -> bool {
        debug_assert_eq!(vector.len(), self.dimension.get());
        if self.rows_by_id.contains_key(&id) {
            return false;
        }
        self.rows_by_id.insert(id, self.ids.len());
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        true
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Document id stored at `row`.
    #[must_use]
    pub fn id(&self, row: usize) -> DocumentId {
        self.ids[row]
    }

    /// Embedding stored at `row`.
    #[must_use]
    pub fn vector(&self, row: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.data[row * dim..(row + 1) * dim]
    }

    /// Row of the given document, if it is stored.
    #[must_use]
    pub fn row_of(&self, id: DocumentId) -> Option<usize> {
        self.rows_by_id.get(&id).copied()
    }

    /// All stored ids in row order.
    #[must_use]
    pub fn ids(&self) -> &[DocumentId] {
        &self.ids
    }

    /// Iterates `(id, embedding)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (DocumentId, &[f32])> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.dimension.get()))
    }

    /// Exact top-k over the given rows.
    pub(crate) fn scan_rows(
        &self,
        query: &[f32],
        rows: &[usize],
        k: usize,
        metric: Metric,
    ) -> Vec<SearchHit> {
        let mut top = TopK::new(k);
        for &row in rows {
            top.offer(SearchHit::new(
                self.ids[row],
                metric.distance(query, self.vector(row)),
            ));
        }
        top.into_sorted_vec()
    }

    /// Exact top-k over every row, going parallel for large stores.
    pub(crate) fn scan_all(&self, query: &[f32], k: usize, metric: Metric) -> Vec<SearchHit> {
        let dim = self.dimension.get();

        if self.len() < PARALLEL_THRESHOLD {
            let mut top = TopK::new(k);
            for (id, vector) in self.iter() {
                top.offer(SearchHit::new(id, metric.distance(query, vector)));
            }
            return top.into_sorted_vec();
        }

        let partials: Vec<Vec<SearchHit>> = self
            .data
            .par_chunks(dim * PARALLEL_CHUNK_ROWS)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let base = chunk_idx * PARALLEL_CHUNK_ROWS;
                let mut top = TopK::new(k);
                for (offset, vector) in chunk.chunks_exact(dim).enumerate() {
                    top.offer(SearchHit::new(
                        self.ids[base + offset],
                        metric.distance(query, vector),
                    ));
                }
                top.into_vec()
            })
            .collect();

        let mut merged = TopK::new(k);
        for hit in partials.into_iter().flatten() {
            merged.offer(hit);
        }
        merged.into_sorted_vec()
    }
}

/// Bounded max-heap keeping the `k` smallest hits seen so far.
///
/// The heap top is the current worst hit, so each offer is O(log k) and
/// the collector never holds more than `k` entries.
#[derive(Debug)]
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<SearchHit>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub(crate) fn offer(&mut self, hit: SearchHit) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(hit);
        } else if let Some(worst) = self.heap.peek()
            && hit < *worst
        {
            self.heap.pop();
            self.heap.push(hit);
        }
    }

    fn into_vec(self) -> Vec<SearchHit> {
        self.heap.into_vec()
    }

    /// Hits ordered nearest-first, ties by ascending id.
    pub(crate) fn into_sorted_vec(self) -> Vec<SearchHit> {
        self.heap.into_sorted_vec()
    }
}

/// Exact search over every stored vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    metric: Metric,
    store: VectorStore,
}

impl FlatIndex {
    pub(crate) fn new(metric: Metric, store: VectorStore) -> Self {
        Self { metric, store }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Returns the `k` nearest stored vectors, nearest first.
    ///
    /// The query length must already match the store dimension.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }
        self.store.scan_all(query, k, self.metric)
    }
}
