//! Partitioned (inverted-file) index.
//!
//! Vectors are grouped into `P` partitions around k-means centroids. A query
//! ranks the centroids, scans the members of the nearest `C` partitions
//! exactly, and returns the best `k` among them. Recall is traded for speed:
//! a true neighbour sitting in an unprobed partition is missed.
//!
//! When the probed partitions hold fewer than `k` members, probing continues
//! in centroid order until `k` candidates are available or every partition
//! has been visited.

use crate::vector::flat::VectorStore;
use crate::vector::types::{Distance, Metric, SearchHit};

/// Partitioned index over a [`VectorStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedIndex {
    metric: Metric,
    store: VectorStore,
    centroids: Vec<Vec<f32>>,
    /// Row indices of each partition's members, ascending.
    lists: Vec<Vec<u32>>,
    probes: usize,
    seed: u64,
}

impl PartitionedIndex {
    /// Assembles an index from trained parts.
    ///
    /// `lists` must cover every store row exactly once and have one entry per
    /// centroid; the builder and the decoder both guarantee this.
    pub(crate) fn from_parts(
        metric: Metric,
        store: VectorStore,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<u32>>,
        probes: usize,
        seed: u64,
    ) -> Self {
        debug_assert_eq!(centroids.len(), lists.len());
        debug_assert_eq!(lists.iter().map(Vec::len).sum::<usize>(), store.len());
        let probes = probes.clamp(1, centroids.len().max(1));
        Self {
            metric,
            store,
            centroids,
            lists,
            probes,
            seed,
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Number of partitions (`P`).
    #[must_use]
    pub fn partitions(&self) -> usize {
        self.centroids.len()
    }

    /// Partitions scanned per query (`C`).
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes
    }

    /// Seed the partitions were trained with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Member rows of each partition.
    #[must_use]
    pub fn lists(&self) -> &[Vec<u32>] {
        &self.lists
    }

    /// Sizes of every partition, in partition order.
    #[must_use]
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(Vec::len).collect()
    }

    /// Returns up to `k` approximate nearest neighbours, nearest first.
    ///
    /// The query length must already match the store dimension.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        let order = self.rank_partitions(query);

        let mut candidates: Vec<usize> = Vec::new();
        for (probed, &partition) in order.iter().enumerate() {
            if probed >= self.probes && candidates.len() >= k {
                break;
            }
            candidates.extend(self.lists[partition].iter().map(|&row| row as usize));
        }

        tracing::trace!(
            "partitioned search scanned {} of {} vectors",
            candidates.len(),
            self.store.len()
        );

        self.store.scan_rows(query, &candidates, k, self.metric)
    }

    /// Partition indices ordered by centroid distance, ties by index.
    fn rank_partitions(&self, query: &[f32]) -> Vec<usize> {
        let mut ranked: Vec<(Distance, usize)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, centroid)| (self.metric.distance(query, centroid), i))
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, i)| i).collect()
    }
}
