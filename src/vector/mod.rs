//! Vector indexing and nearest-neighbour search.
//!
//! Embeddings are stored row-major next to their [`DocumentId`]s and searched
//! either exhaustively (flat) or through k-means partitions (an IVF layout
//! where a query scans only the partitions whose centroids are nearest).
//!
//! # Architecture
//! - [`IndexBuilder`] turns a batch of `(id, embedding)` pairs into an
//!   immutable [`VectorIndex`], picking the structure from the corpus size
//! - [`VectorIndex::search`] returns hits ordered by distance, ties by id
//! - [`save_index`] / [`load_index`] persist the index as a versioned blob
//!   whose header carries dimension and metric

mod builder;
mod clustering;
mod distance;
mod flat;
mod index;
mod partitioned;
mod storage;
mod types;

pub use builder::{
    DEFAULT_FLAT_THRESHOLD, DEFAULT_SEED, IndexBuilder, IndexVariant, MAX_AUTO_PARTITIONS,
    ResolvedVariant, SAMPLES_PER_PARTITION,
};
pub use clustering::{
    ClusteringError, DEFAULT_MAX_ITERATIONS, KMeansParams, KMeansResult,
    assign_to_nearest_centroid, kmeans_clustering, sample_indices,
};
pub use distance::{
    cosine_distance, cosine_similarity, l2_distance, normalize_vector, normalize_vector_copy,
};
pub use flat::{FlatIndex, VectorStore};
pub use index::{
    CorpusFingerprint, IndexInfo, IndexProvenance, VectorIndex, fingerprint_hex, fingerprint_ids,
};
pub use partitioned::PartitionedIndex;
pub use storage::{
    FORMAT_VERSION, IndexHeader, load_index, load_index_unchecked, read_header, save_index,
};
pub use types::{
    DocumentId, Distance, Metric, SearchHit, SearchResult, VECTOR_DIMENSION_384, VectorDimension,
    VectorError,
};
