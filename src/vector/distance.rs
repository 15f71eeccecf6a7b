//! Distance kernels for the supported metrics.
//!
//! Every kernel assumes both slices have the same length; callers validate
//! dimensions before reaching this module.

use crate::vector::types::{Distance, Metric};

/// Epsilon below which a norm is treated as zero.
const EPSILON: f32 = 1e-10;

impl Metric {
    /// Computes the distance between two vectors under this metric.
    #[inline]
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Distance {
        let raw = match self {
            Metric::L2 => l2_distance(a, b),
            Metric::Cosine => cosine_distance(a, b),
        };
        Distance::saturating(raw)
    }
}

/// Euclidean distance, `sqrt(sum((a - b)^2))`.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    squared_l2(a, b).sqrt()
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`; a zero-norm vector has similarity 0 with
/// everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = norm(a);
    let norm_b = norm(b);

    if norm_a < EPSILON || norm_b < EPSILON {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Cosine distance, `1 - cosine_similarity`, in `[0, 2]`.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// L2 norm of a vector.
#[inline]
pub fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalizes a vector in-place to unit length.
///
/// Vectors with a near-zero norm are left as they are.
pub fn normalize_vector(vector: &mut [f32]) {
    let n = norm(vector);
    if n > EPSILON {
        for value in vector.iter_mut() {
            *value /= n;
        }
    }
}

/// Creates a normalized copy of a vector.
#[must_use]
pub fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}
