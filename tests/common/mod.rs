//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use docseek::embedding::Embedder;
use docseek::error::{EngineError, EngineResult};
use docseek::vector::{DocumentId, Metric, VectorDimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Embedder that looks texts up in a fixed table.
///
/// Unknown texts fail with `EmbeddingFailure`, which lets tests drive the
/// error path deterministically.
pub struct TableEmbedder {
    dimension: VectorDimension,
    table: HashMap<String, Vec<f32>>,
    name: String,
}

impl TableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).expect("valid dimension"),
            table: HashMap::new(),
            name: format!("table-{dimension}"),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension.get());
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl Embedder for TableEmbedder {
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| EngineError::EmbeddingFailure {
                reason: format!("no vector for '{text}'"),
            })
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Ids {1,2,3} at [0,0], [1,0] and [5,5].
pub fn example_entries() -> Vec<(DocumentId, Vec<f32>)> {
    vec![
        (DocumentId::new(1), vec![0.0, 0.0]),
        (DocumentId::new(2), vec![1.0, 0.0]),
        (DocumentId::new(3), vec![5.0, 5.0]),
    ]
}

/// `count` uniformly random vectors with ids `1..=count`.
pub fn random_entries(count: usize, dimension: usize, seed: u64) -> Vec<(DocumentId, Vec<f32>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count as u64)
        .map(|id| {
            let vector = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
            (DocumentId::new(id), vector)
        })
        .collect()
}

pub fn random_vector(dimension: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Exhaustive nearest neighbours, ties broken by ascending id.
pub fn brute_force(
    entries: &[(DocumentId, Vec<f32>)],
    query: &[f32],
    k: usize,
    metric: Metric,
) -> Vec<(DocumentId, f32)> {
    let mut scored: Vec<(DocumentId, f32)> = entries
        .iter()
        .map(|(id, vector)| (*id, metric.distance(query, vector).get()))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

pub fn dim(value: usize) -> VectorDimension {
    VectorDimension::new(value).expect("valid dimension")
}

/// Temp directory holding a file path for an index.
pub fn temp_index_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("index.dskx");
    (dir, path)
}
