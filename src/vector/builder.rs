//! One-shot construction of a [`VectorIndex`] from a batch of embeddings.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::{EngineError, EngineResult};
use crate::vector::clustering::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, KMeansParams, assign_to_nearest_centroid,
    kmeans_clustering, sample_indices,
};
use crate::vector::flat::{FlatIndex, VectorStore};
use crate::vector::index::{IndexProvenance, VectorIndex, fingerprint_ids};
use crate::vector::partitioned::PartitionedIndex;
use crate::vector::types::{DocumentId, Metric, VectorDimension};

/// Corpus size from which `Auto` switches to the partitioned structure.
pub const DEFAULT_FLAT_THRESHOLD: usize = 10_000;

/// Upper bound on automatically chosen partition counts.
pub const MAX_AUTO_PARTITIONS: usize = 4096;

/// Training vectors drawn per partition when no sample size is configured.
pub const SAMPLES_PER_PARTITION: usize = 256;

/// Default seed for partition training.
pub const DEFAULT_SEED: u64 = 42;

/// Which index structure to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexVariant {
    /// Flat below the flat threshold, partitioned above it.
    #[default]
    Auto,
    /// Exact exhaustive scan.
    Flat,
    /// Partitioned structure with `P` partitions and `C` probes.
    Partitioned,
}

impl IndexVariant {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Flat => "flat",
            Self::Partitioned => "partitioned",
        }
    }
}

impl fmt::Display for IndexVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "flat" | "exact" => Ok(Self::Flat),
            "partitioned" | "ivf" => Ok(Self::Partitioned),
            other => Err(format!(
                "unknown index variant '{other}' (expected auto, flat or partitioned)"
            )),
        }
    }
}

/// Structure chosen for a concrete corpus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVariant {
    Flat,
    Partitioned { partitions: usize, probes: usize },
}

/// Builds immutable vector indices.
///
/// ```no_run
/// use docseek::vector::{DocumentId, IndexBuilder, IndexVariant, Metric, VectorDimension};
///
/// let builder = IndexBuilder::new(VectorDimension::new(2)?, Metric::L2)
///     .with_variant(IndexVariant::Flat);
/// let index = builder.build(vec![
///     (DocumentId::new(1), vec![0.0, 0.0]),
///     (DocumentId::new(2), vec![1.0, 0.0]),
/// ])?;
/// assert_eq!(index.len(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    dimension: VectorDimension,
    metric: Metric,
    variant: IndexVariant,
    partitions: Option<usize>,
    probes: Option<usize>,
    seed: u64,
    flat_threshold: usize,
    max_iterations: usize,
    training_sample: Option<usize>,
    model: String,
}

impl IndexBuilder {
    #[must_use]
    pub fn new(dimension: VectorDimension, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            variant: IndexVariant::Auto,
            partitions: None,
            probes: None,
            seed: DEFAULT_SEED,
            flat_threshold: DEFAULT_FLAT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            training_sample: None,
            model: String::new(),
        }
    }

    /// Builder configured from the `[index]` settings section.
    pub fn from_config(config: &IndexConfig, dimension: VectorDimension) -> EngineResult<Self> {
        let variant = config
            .variant
            .parse::<IndexVariant>()
            .map_err(EngineError::InvalidConfiguration)?;
        let metric = config
            .metric
            .parse::<Metric>()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        let builder = Self::new(dimension, metric)
            .with_variant(variant)
            .with_partitions(config.partitions)
            .with_probes(config.probes)
            .with_seed(config.seed)
            .with_flat_threshold(config.flat_threshold)
            .with_max_iterations(config.max_iterations)
            .with_training_sample(config.training_sample);
        builder.validate()?;
        Ok(builder)
    }

    #[must_use]
    pub fn with_variant(mut self, variant: IndexVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Fixes the partition count `P` instead of deriving it from the corpus size.
    #[must_use]
    pub fn with_partitions(mut self, partitions: Option<usize>) -> Self {
        self.partitions = partitions;
        self
    }

    /// Fixes the probe count `C` instead of deriving it from `P`.
    #[must_use]
    pub fn with_probes(mut self, probes: Option<usize>) -> Self {
        self.probes = probes;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_flat_threshold(mut self, threshold: usize) -> Self {
        self.flat_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations.max(1);
        self
    }

    /// Caps the number of vectors used to train centroids.
    #[must_use]
    pub fn with_training_sample(mut self, sample: Option<usize>) -> Self {
        self.training_sample = sample;
        self
    }

    /// Records the embedding model the vectors come from.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn variant(&self) -> IndexVariant {
        self.variant
    }

    fn validate(&self) -> EngineResult<()> {
        if self.partitions == Some(0) {
            return Err(EngineError::InvalidConfiguration(
                "partition count must be at least 1".to_string(),
            ));
        }
        if self.probes == Some(0) {
            return Err(EngineError::InvalidConfiguration(
                "probe count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Chooses the concrete structure for a corpus of `count` documents.
    #[must_use]
    pub fn resolve_variant(&self, count: usize) -> ResolvedVariant {
        let partitioned = match self.variant {
            IndexVariant::Flat => false,
            IndexVariant::Partitioned => true,
            IndexVariant::Auto => count >= self.flat_threshold,
        };
        if !partitioned || count == 0 {
            return ResolvedVariant::Flat;
        }

        let partitions = self
            .partitions
            .unwrap_or_else(|| auto_partitions(count))
            .clamp(1, count);
        let probes = self
            .probes
            .unwrap_or_else(|| (partitions / 16).max(1))
            .clamp(1, partitions);
        ResolvedVariant::Partitioned { partitions, probes }
    }

    /// Builds an index from `(id, embedding)` pairs.
    ///
    /// Fails on the first embedding whose length differs from the configured
    /// dimension or that holds a non-finite value, or on the first repeated
    /// id. No index is produced on error.
    pub fn build<I, V>(&self, entries: I) -> EngineResult<VectorIndex>
    where
        I: IntoIterator<Item = (DocumentId, V)>,
        V: AsRef<[f32]>,
    {
        self.validate()?;
        let started = Instant::now();

        let entries = entries.into_iter();
        let mut store = VectorStore::with_capacity(self.dimension, entries.size_hint().0);
        for (id, vector) in entries {
            let vector = vector.as_ref();
            if vector.len() != self.dimension.get() {
                return Err(EngineError::DimensionMismatch {
                    expected: self.dimension.get(),
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(EngineError::NonFiniteEmbedding(id));
            }
            if !store.push(id, vector) {
                return Err(EngineError::DuplicateDocumentId(id));
            }
        }

        let provenance = IndexProvenance {
            model: self.model.clone(),
            corpus_fingerprint: fingerprint_ids(store.ids()),
        };

        let index = match self.resolve_variant(store.len()) {
            ResolvedVariant::Flat => VectorIndex::flat(FlatIndex::new(self.metric, store), provenance),
            ResolvedVariant::Partitioned { partitions, probes } => VectorIndex::partitioned(
                self.train_partitions(store, partitions, probes)?,
                provenance,
            ),
        };

        tracing::info!(
            "built {} index over {} documents in {:.2?}",
            index.variant_name(),
            index.len(),
            started.elapsed()
        );
        Ok(index)
    }

    fn train_partitions(
        &self,
        store: VectorStore,
        partitions: usize,
        probes: usize,
    ) -> EngineResult<PartitionedIndex> {
        let sample_size = self
            .training_sample
            .unwrap_or(partitions.saturating_mul(SAMPLES_PER_PARTITION))
            .max(partitions);
        let sample = sample_indices(store.len(), sample_size, self.seed);
        let training: Vec<&[f32]> = sample.iter().map(|&row| store.vector(row)).collect();

        tracing::debug!(
            "training {partitions} partitions on {} of {} vectors (seed {})",
            training.len(),
            store.len(),
            self.seed
        );

        let params = KMeansParams {
            seed: self.seed,
            max_iterations: self.max_iterations,
            tolerance: DEFAULT_TOLERANCE,
        };
        let centroids = kmeans_clustering(&training, partitions, self.metric, &params)?.centroids;

        let assignments: Vec<usize> = (0..store.len())
            .into_par_iter()
            .map(|row| assign_to_nearest_centroid(store.vector(row), &centroids, self.metric))
            .collect();

        let mut lists = vec![Vec::new(); centroids.len()];
        for (row, &partition) in assignments.iter().enumerate() {
            lists[partition].push(row as u32);
        }

        Ok(PartitionedIndex::from_parts(
            self.metric,
            store,
            centroids,
            lists,
            probes,
            self.seed,
        ))
    }
}

/// `ceil(sqrt(n))`, clamped to `[1, MAX_AUTO_PARTITIONS]`.
fn auto_partitions(count: usize) -> usize {
    let root = (count as f64).sqrt().ceil() as usize;
    root.clamp(1, MAX_AUTO_PARTITIONS)
}
