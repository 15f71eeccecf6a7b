/// The main library module for docseek
pub mod config;
pub mod corpus;
pub mod display;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod io;
pub mod vector;
pub mod watcher;

// Explicit exports for better API clarity
pub use config::Settings;
pub use corpus::{CorpusStore, DocumentRecord, JsonCorpus};
pub use embedding::{Embedder, FastEmbedEmbedder, HashEmbedder, create_embedder};
pub use engine::{IndexHandle, ResolvedHit, SearchEngine, build_from_corpus, resolve_hits};
pub use error::{EngineError, EngineResult};
pub use vector::{
    DocumentId, IndexBuilder, IndexInfo, IndexVariant, Metric, SearchHit, SearchResult,
    VectorDimension, VectorIndex, load_index, save_index,
};
pub use watcher::IndexWatcher;
