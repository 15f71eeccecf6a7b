//! K-means clustering for partitioned vector indexing.
//!
//! A pure Rust implementation of Lloyd's algorithm with K-means++
//! initialization. All randomness comes from a seeded `StdRng`, so the same
//! input, `k` and seed always produce the same centroids and assignments.
//!
//! # Algorithm Details
//! - Distance metric: the index metric (L2 means, or spherical means for cosine)
//! - Initialization: K-means++
//! - Stops on unchanged assignments, small centroid movement or `max_iterations`
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) time complexity
//! - O(k * d) space for centroids
//! - Parallel assignment step

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::vector::distance::{normalize_vector, normalize_vector_copy};
use crate::vector::types::Metric;

/// Default maximum number of Lloyd iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Default convergence tolerance for mean centroid movement.
pub const DEFAULT_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Tunables for a clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParams {
    /// Seed for initialization, empty-cluster reseeding and sampling.
    pub seed: u64,
    /// Maximum number of Lloyd iterations.
    pub max_iterations: usize,
    /// Stop once the mean centroid movement falls below this value.
    pub tolerance: f32,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, each a vector of the same dimension as input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Zero-based cluster index for each input vector.
    pub assignments: Vec<usize>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are generated before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,
}

/// Performs K-means clustering on a set of vectors.
///
/// # Arguments
/// * `vectors` - Input vectors to cluster (non-empty, same dimension)
/// * `k` - Number of clusters (`1..=vectors.len()`)
/// * `metric` - Metric used for assignment; cosine keeps centroids unit length
/// * `params` - Seed and convergence settings
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(
    vectors: &[&[f32]],
    k: usize,
    metric: Metric,
    params: &KMeansParams,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, metric, &mut rng);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments = assign_all(vectors, &centroids, metric);
        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= params.max_iterations {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, metric, &mut rng);
        let movement = calculate_centroid_movement(&centroids, &new_centroids, metric);
        centroids = new_centroids;

        if movement < params.tolerance {
            // Centroids moved, so assignments must follow them once more.
            assignments = assign_all(vectors, &centroids, metric);
            break;
        }
    }

    if iterations >= params.max_iterations {
        tracing::debug!(
            "k-means stopped at the iteration cap ({}) before assignments settled",
            params.max_iterations
        );
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Returns the index of the centroid nearest to `vector`.
///
/// Ties go to the lowest centroid index.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>], metric: Metric) -> usize {
    let mut best_distance = f32::INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = metric.distance(vector, centroid).get();
        if distance < best_distance {
            best_distance = distance;
            best_cluster = i;
        }
    }

    best_cluster
}

/// Picks a deterministic training sample of at most `max_samples` row indices.
///
/// Returns every index when the input is already small enough. The sample is
/// sorted so the training input keeps corpus order.
#[must_use]
pub fn sample_indices(total: usize, max_samples: usize, seed: u64) -> Vec<usize> {
    if max_samples == 0 || total <= max_samples {
        return (0..total).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sample = rand::seq::index::sample(&mut rng, total, max_samples).into_vec();
    sample.sort_unstable();
    sample
}

fn assign_all(vectors: &[&[f32]], centroids: &[Vec<f32>], metric: Metric) -> Vec<usize> {
    vectors
        .par_iter()
        .map(|vector| assign_to_nearest_centroid(vector, centroids, metric))
        .collect()
}

/// Recomputes centroids as the mean of their assigned vectors.
fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[usize],
    k: usize,
    metric: Metric,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0f32; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        for (sum, &value) in new_centroids[cluster].iter_mut().zip(vector.iter()) {
            *sum += value;
        }
        cluster_sizes[cluster] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // Empty cluster: reseed from a random member of the input
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = seed_centroid(vectors[random_idx], metric);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            if metric == Metric::Cosine {
                normalize_vector(centroid);
            }
        }
    }

    new_centroids
}

/// Initializes centroids using the K-means++ algorithm.
///
/// When fewer than `k` distinct points exist the remaining centroids are
/// drawn uniformly; they start empty and get reseeded by the update step.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[&[f32]],
    k: usize,
    metric: Metric,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(seed_centroid(vectors[first_idx], metric));

    // Squared distance of each vector to its nearest chosen centroid
    let mut nearest: Vec<f32> = vectors
        .iter()
        .map(|v| squared(metric.distance(v, &centroids[0]).get()))
        .collect();

    while centroids.len() < k {
        let total: f32 = nearest.iter().sum();

        let next_idx = if total < EPSILON {
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f32>() * total;
            let mut cumulative = 0.0;
            let mut chosen = vectors.len() - 1;
            for (i, &distance) in nearest.iter().enumerate() {
                cumulative += distance;
                if cumulative >= target && distance > 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let centroid = seed_centroid(vectors[next_idx], metric);
        for (slot, vector) in nearest.iter_mut().zip(vectors.iter()) {
            let d = squared(metric.distance(vector, &centroid).get());
            if d < *slot {
                *slot = d;
            }
        }
        centroids.push(centroid);
    }

    centroids
}

/// Mean centroid movement between iterations, measured with the index metric.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>], metric: Metric) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| metric.distance(old_c, new_c).get())
        .sum::<f32>()
        / old.len() as f32
}

fn seed_centroid(vector: &[f32], metric: Metric) -> Vec<f32> {
    match metric {
        Metric::Cosine => normalize_vector_copy(vector),
        Metric::L2 => vector.to_vec(),
    }
}

#[inline]
fn squared(x: f32) -> f32 {
    x * x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(vectors: &[Vec<f32>]) -> Vec<&[f32]> {
        vectors.iter().map(Vec::as_slice).collect()
    }

    fn three_blobs() -> Vec<Vec<f32>> {
        vec![
            // Cluster 1: mostly x-axis
            vec![1.0, 0.1, 0.0],
            vec![0.9, 0.2, 0.1],
            vec![1.1, 0.0, 0.2],
            // Cluster 2: mostly y-axis
            vec![0.1, 1.0, 0.0],
            vec![0.2, 0.9, 0.1],
            vec![0.0, 1.1, 0.2],
            // Cluster 3: mostly z-axis
            vec![0.0, 0.1, 1.0],
            vec![0.1, 0.2, 0.9],
            vec![0.2, 0.0, 1.1],
        ]
    }

    #[test]
    fn test_assign_to_nearest_centroid() {
        let centroids = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];

        for metric in [Metric::L2, Metric::Cosine] {
            assert_eq!(assign_to_nearest_centroid(&[0.9, 0.1, 0.0], &centroids, metric), 0);
            assert_eq!(assign_to_nearest_centroid(&[0.1, 0.9, 0.1], &centroids, metric), 1);
            assert_eq!(assign_to_nearest_centroid(&[0.0, 0.1, 0.9], &centroids, metric), 2);
        }
    }

    #[test]
    fn test_assign_ties_go_to_lowest_index() {
        let centroids = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        assert_eq!(assign_to_nearest_centroid(&[0.0, 1.0], &centroids, Metric::L2), 0);
    }

    #[test]
    fn test_kmeans_clustering_basic() {
        let vectors = three_blobs();

        for metric in [Metric::L2, Metric::Cosine] {
            let result =
                kmeans_clustering(&refs(&vectors), 3, metric, &KMeansParams::default()).unwrap();

            assert_eq!(result.centroids.len(), 3);
            assert_eq!(result.assignments.len(), 9);
            assert!(result.iterations <= DEFAULT_MAX_ITERATIONS);

            // Similar vectors end up together
            for group in result.assignments.chunks(3) {
                assert!(group.iter().all(|&c| c == group[0]));
            }
            assert_ne!(result.assignments[0], result.assignments[3]);
            assert_ne!(result.assignments[3], result.assignments[6]);
            assert_ne!(result.assignments[0], result.assignments[6]);
        }
    }

    #[test]
    fn test_kmeans_is_deterministic_for_a_seed() {
        let vectors: Vec<Vec<f32>> = (0..60)
            .map(|i| {
                let angle = i as f32 * 0.37;
                vec![angle.cos() * (1 + i % 4) as f32, angle.sin(), (i % 7) as f32 * 0.1]
            })
            .collect();
        let params = KMeansParams {
            seed: 7,
            ..KMeansParams::default()
        };

        let first = kmeans_clustering(&refs(&vectors), 6, Metric::L2, &params).unwrap();
        let second = kmeans_clustering(&refs(&vectors), 6, Metric::L2, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_kmeans_edge_cases() {
        let empty: Vec<&[f32]> = vec![];
        assert_eq!(
            kmeans_clustering(&empty, 1, Metric::L2, &KMeansParams::default()),
            Err(ClusteringError::EmptyVectorSet)
        );

        let one = vec![vec![1.0, 2.0]];
        assert_eq!(
            kmeans_clustering(&refs(&one), 0, Metric::L2, &KMeansParams::default()),
            Err(ClusteringError::InvalidClusterCount(0))
        );

        let two = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(
            kmeans_clustering(&refs(&two), 3, Metric::L2, &KMeansParams::default()),
            Err(ClusteringError::InvalidClusterCount(3))
        );

        let ragged = vec![vec![1.0, 2.0], vec![3.0, 4.0, 5.0]];
        assert_eq!(
            kmeans_clustering(&refs(&ragged), 1, Metric::L2, &KMeansParams::default()),
            Err(ClusteringError::DimensionMismatch)
        );
    }

    #[test]
    fn test_identical_vectors_still_produce_k_centroids() {
        let vectors = vec![vec![1.0, 1.0]; 5];
        let result =
            kmeans_clustering(&refs(&vectors), 3, Metric::L2, &KMeansParams::default()).unwrap();
        assert_eq!(result.centroids.len(), 3);
        assert!(result.assignments.iter().all(|&c| c < 3));
    }

    #[test]
    fn test_single_cluster() {
        let vectors = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];

        let result =
            kmeans_clustering(&refs(&vectors), 1, Metric::L2, &KMeansParams::default()).unwrap();
        assert_eq!(result.centroids.len(), 1);
        assert!(result.assignments.iter().all(|&c| c == 0));
        // L2 centroid is the plain mean
        assert_eq!(result.centroids[0], vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_sample_indices() {
        assert_eq!(sample_indices(4, 10, 1), vec![0, 1, 2, 3]);

        let sample = sample_indices(1000, 50, 9);
        assert_eq!(sample.len(), 50);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
        assert!(sample.iter().all(|&i| i < 1000));
        assert_eq!(sample, sample_indices(1000, 50, 9));
    }
}
