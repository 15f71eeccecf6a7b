//! Type-safe wrappers and core types for vector search.
//!
//! Newtypes keep document ids, dimensions and distances from being mixed up
//! with the plain integers and floats they wrap.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Dimension of the default `AllMiniLML6V2` embedding model.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Stable identifier of a corpus document.
///
/// Ids are opaque: the index never interprets them beyond equality and the
/// ascending order used to break distance ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Creates a new `DocumentId`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(dim: VectorDimension) -> Self {
        dim.0
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance between a query and a stored vector.
///
/// Always finite and non-negative; smaller means more similar. The total
/// order lets distances sit in heaps and sorted results directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Distance(f32);

impl Distance {
    /// Creates a new `Distance` with validation.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if !value.is_finite() {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance must be finite",
            });
        }
        if value < 0.0 {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance cannot be negative",
            });
        }
        Ok(Self(value))
    }

    /// Creates a distance of 0.0 (identical vectors).
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Builds a distance from a kernel output, mapping rounding noise below
    /// zero to zero and non-finite values to `f32::MAX`.
    #[must_use]
    pub(crate) fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self(f32::MAX)
        } else {
            Self(value.clamp(0.0, f32::MAX))
        }
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Distance metric an index is built with.
///
/// The metric is fixed at build time and persisted in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance.
    #[default]
    L2,
    /// Cosine distance, `1 - cos(a, b)`. Equivalent to inner product on
    /// unit-normalized embeddings.
    Cosine,
}

impl Metric {
    /// Tag byte stored in the persisted header.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Metric::L2 => 1,
            Metric::Cosine => 2,
        }
    }

    /// Parses a header tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Metric::L2),
            2 => Some(Metric::Cosine),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "cosine" | "ip" | "inner_product" => Ok(Metric::Cosine),
            other => Err(VectorError::UnknownMetric(other.to_string())),
        }
    }
}

/// One ranked hit: a document and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SearchHit {
    /// Distance to the query; compared first so hits order nearest-first.
    pub distance: Distance,
    /// Document the hit refers to; breaks distance ties in ascending order.
    pub id: DocumentId,
}

impl SearchHit {
    #[must_use]
    pub const fn new(id: DocumentId, distance: Distance) -> Self {
        Self { distance, id }
    }
}

/// Ranked hits for one query, nearest first.
///
/// Distances are non-decreasing across the sequence and the length never
/// exceeds the requested `k` or the number of indexed documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct SearchResult {
    hits: Vec<SearchHit>,
}

impl SearchResult {
    /// Wraps hits that are already sorted nearest-first.
    pub(crate) fn from_sorted(hits: Vec<SearchHit>) -> Self {
        debug_assert!(hits.windows(2).all(|w| w[0] <= w[1]), "hits must be sorted");
        Self { hits }
    }

    /// A result with no hits.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hits in rank order.
    #[must_use]
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }

    /// Document ids in rank order.
    #[must_use]
    pub fn ids(&self) -> Vec<DocumentId> {
        self.hits.iter().map(|hit| hit.id).collect()
    }

    #[must_use]
    pub fn into_hits(self) -> Vec<SearchHit> {
        self.hits
    }
}

impl IntoIterator for SearchResult {
    type Item = SearchHit;
    type IntoIter = std::vec::IntoIter<SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Errors raised by the low-level vector types.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid distance value: {value}\nReason: {reason}")]
    InvalidDistance { value: f32, reason: &'static str },

    #[error("Unknown distance metric '{0}'\nSuggestion: Use 'l2' or 'cosine'")]
    UnknownMetric(String),
}
