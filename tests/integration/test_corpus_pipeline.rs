//! Corpus file to served results, end to end with the hash embedder.

use std::sync::Arc;

use crate::common::temp_index_path;
use docseek::config::EmbeddingConfig;
use docseek::corpus::{CorpusStore, JsonCorpus};
use docseek::embedding::{Embedder, HashEmbedder, create_embedder};
use docseek::engine::{SearchEngine, build_from_corpus};
use docseek::error::EngineError;
use docseek::vector::{DocumentId, IndexBuilder, Metric, VectorDimension, load_index, save_index};
use tempfile::TempDir;

const CORPUS: &str = r#"{"id": 1, "title": "Reset your password", "link": "https://help.example.com/1", "text": "forgot password reset login email link"}
{"id": 2, "title": "Update billing details", "link": "https://help.example.com/2", "text": "credit card billing invoice payment update"}
{"id": 3, "title": "Track a shipment", "text": "order shipping tracking number delivery courier"}
{"id": 4, "title": "Close your account", "category": "account", "text": "delete account close profile data removal"}
"#;

fn write_corpus(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("corpus.jsonl");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_build_save_load_and_query() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonCorpus::load(&write_corpus(&dir, CORPUS)).unwrap();
    assert_eq!(corpus.len(), 4);

    let embedder = Arc::new(HashEmbedder::new(VectorDimension::new(256).unwrap()));
    let builder = IndexBuilder::new(embedder.dimension(), Metric::Cosine);

    let mut reports = Vec::new();
    let index = build_from_corpus(embedder.as_ref(), &corpus.documents(), &builder, 3, |done, total| {
        reports.push((done, total))
    })
    .unwrap();
    assert_eq!(reports, vec![(3, 4), (4, 4)]);
    assert_eq!(index.model(), "hash-256");

    let (_index_dir, path) = temp_index_path();
    save_index(&index, &path).unwrap();
    let loaded = load_index(&path, embedder.dimension(), Metric::Cosine).unwrap();

    let engine = SearchEngine::new(embedder, loaded, Metric::Cosine).unwrap();
    assert!(engine.verify_corpus(&corpus.ids()));

    let hits = engine
        .search_resolved("forgot password reset login email link", 2, &corpus)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, DocumentId::new(1));
    assert_eq!(hits[0].document.title, "Reset your password");
    assert_eq!(hits[0].document.link.as_deref(), Some("https://help.example.com/1"));
    assert!(hits[0].distance < 1e-5);
}

#[test]
fn test_extra_fields_survive_and_title_is_fallback_text() {
    let dir = TempDir::new().unwrap();
    let corpus = JsonCorpus::load(&write_corpus(
        &dir,
        "{\"id\": 9, \"title\": \"Gift cards\", \"category\": \"billing\"}\n",
    ))
    .unwrap();

    let record = corpus.resolve(DocumentId::new(9)).unwrap();
    assert_eq!(record.embedding_text(), "Gift cards");
    assert_eq!(record.extra["category"], "billing");
    assert!(corpus.resolve(DocumentId::new(10)).is_none());
}

#[test]
fn test_duplicate_ids_in_corpus_file() {
    let dir = TempDir::new().unwrap();
    let path = write_corpus(
        &dir,
        "{\"id\": 1, \"title\": \"a\"}\n{\"id\": 1, \"title\": \"b\"}\n",
    );

    let err = JsonCorpus::load(&path).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDocumentId(id) if id == DocumentId::new(1)));
}

#[test]
fn test_empty_corpus_builds_empty_index() {
    let embedder = HashEmbedder::new(VectorDimension::new(32).unwrap());
    let builder = IndexBuilder::new(embedder.dimension(), Metric::L2);

    let index = build_from_corpus(&embedder, &[], &builder, 16, |_, _| {}).unwrap();

    assert!(index.is_empty());
    let engine = SearchEngine::new(Arc::new(embedder), index, Metric::L2).unwrap();
    assert!(engine.search("anything", 10).unwrap().is_empty());
}

#[test]
fn test_embedder_from_settings() {
    let config = EmbeddingConfig {
        backend: "hash".to_string(),
        dimension: 48,
        ..EmbeddingConfig::default()
    };

    let embedder = create_embedder(&config).unwrap();

    assert_eq!(embedder.dimension().get(), 48);
    assert_eq!(embedder.model_name(), "hash-48");
    assert_eq!(embedder.embed("billing").unwrap().len(), 48);
}

#[test]
fn test_index_from_other_embedder_is_refused() {
    let small = HashEmbedder::new(VectorDimension::new(16).unwrap());
    let index = build_from_corpus(
        &small,
        &[(DocumentId::new(1), "billing")],
        &IndexBuilder::new(small.dimension(), Metric::L2),
        8,
        |_, _| {},
    )
    .unwrap();
    let (_dir, path) = temp_index_path();
    save_index(&index, &path).unwrap();

    let large = HashEmbedder::new(VectorDimension::new(64).unwrap());
    let err = load_index(&path, large.dimension(), Metric::L2).unwrap_err();
    assert!(matches!(
        err,
        EngineError::IndexDimensionMismatch { index: 16, embedder: 64 }
    ));
}
