//! SearchEngine behaviour across queries, rebuilds and index swaps.

use std::sync::Arc;

use crate::common::{TableEmbedder, dim, example_entries, random_entries};
use docseek::embedding::Embedder;
use docseek::engine::SearchEngine;
use docseek::error::EngineError;
use docseek::vector::{DocumentId, IndexBuilder, IndexVariant, Metric, VectorIndex};

fn example_engine() -> SearchEngine {
    let embedder = TableEmbedder::new(2)
        .with("near origin", vec![0.1, 0.0])
        .with("far corner", vec![4.0, 4.0])
        .with("wide", vec![0.0, 0.0]);
    let index = IndexBuilder::new(dim(2), Metric::L2)
        .with_model(embedder.model_name())
        .build(example_entries())
        .unwrap();
    SearchEngine::new(Arc::new(embedder), index, Metric::L2).unwrap()
}

#[test]
fn test_query_embeds_and_ranks() {
    let engine = example_engine();

    let result = engine.search("near origin", 2).unwrap();
    assert_eq!(result.ids(), vec![DocumentId::new(1), DocumentId::new(2)]);

    let result = engine.search("far corner", 1).unwrap();
    assert_eq!(result.ids(), vec![DocumentId::new(3)]);
}

#[test]
fn test_k_is_clamped_to_corpus_size() {
    let engine = example_engine();

    assert_eq!(engine.search("wide", 50).unwrap().len(), 3);
    assert_eq!(engine.search("wide", 0).unwrap().len(), 1);
}

#[test]
fn test_embedding_failure_only_fails_that_request() {
    let engine = example_engine();

    let err = engine.search("unknown text", 2).unwrap_err();
    assert!(matches!(err, EngineError::EmbeddingFailure { .. }));
    assert!(err.is_request_scoped());

    assert_eq!(engine.search("near origin", 1).unwrap().len(), 1);
}

#[test]
fn test_engine_refuses_mismatched_index() {
    let index = IndexBuilder::new(dim(3), Metric::L2)
        .build(vec![(DocumentId::new(1), vec![0.0, 0.0, 0.0])])
        .unwrap();
    let err = SearchEngine::new(Arc::new(TableEmbedder::new(2)), index, Metric::L2).unwrap_err();
    assert!(matches!(
        err,
        EngineError::IndexDimensionMismatch { index: 3, embedder: 2 }
    ));

    let cosine = IndexBuilder::new(dim(2), Metric::Cosine)
        .build(example_entries())
        .unwrap();
    let err = SearchEngine::new(Arc::new(TableEmbedder::new(2)), cosine, Metric::L2).unwrap_err();
    assert!(matches!(err, EngineError::MetricMismatch { .. }));
}

#[test]
fn test_rebuild_swaps_while_old_snapshot_stays_valid() {
    let engine = example_engine();
    let before = engine.index();

    let info = engine
        .rebuild(
            vec![
                (DocumentId::new(10), vec![0.1, 0.0]),
                (DocumentId::new(11), vec![9.0, 9.0]),
            ],
            &IndexBuilder::new(dim(2), Metric::L2),
        )
        .unwrap();

    assert_eq!(info.documents, 2);
    assert_eq!(info.model, "table-2");
    assert_eq!(
        engine.search("near origin", 1).unwrap().ids(),
        vec![DocumentId::new(10)]
    );

    // A reader that grabbed the index before the swap still sees all of it.
    assert_eq!(before.len(), 3);
    assert_eq!(
        before.search(&[0.1, 0.0], 1).unwrap().ids(),
        vec![DocumentId::new(1)]
    );
}

#[test]
fn test_failed_rebuild_keeps_serving_index() {
    let engine = example_engine();

    let err = engine
        .rebuild(
            vec![
                (DocumentId::new(5), vec![0.0, 0.0]),
                (DocumentId::new(5), vec![1.0, 1.0]),
            ],
            &IndexBuilder::new(dim(2), Metric::L2),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDocumentId(_)));

    let err = engine
        .rebuild(example_entries(), &IndexBuilder::new(dim(2), Metric::Cosine))
        .unwrap_err();
    assert!(matches!(err, EngineError::MetricMismatch { .. }));

    assert_eq!(engine.info().documents, 3);
    assert_eq!(
        engine.search("near origin", 1).unwrap().ids(),
        vec![DocumentId::new(1)]
    );
}

#[test]
fn test_rebuild_with_non_finite_embedding_is_refused() {
    let engine = example_engine();

    let err = engine
        .rebuild(
            vec![
                (DocumentId::new(20), vec![0.0, 0.0]),
                (DocumentId::new(21), vec![f32::NAN, 0.0]),
            ],
            &IndexBuilder::new(dim(2), Metric::L2),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NonFiniteEmbedding(id) if id == DocumentId::new(21)));
    assert!(!err.is_request_scoped());

    assert_eq!(engine.info().documents, 3);
    let serving = engine.index();
    assert_eq!(VectorIndex::from_bytes(&serving.to_bytes()).unwrap(), *serving);
}

#[test]
fn test_replace_index_checks_compatibility() {
    let engine = example_engine();

    let wrong = VectorIndex::empty(dim(4), Metric::L2, "table-4");
    assert!(engine.replace_index(wrong).is_err());
    assert_eq!(engine.info().documents, 3);

    let empty = VectorIndex::empty(dim(2), Metric::L2, "table-2");
    let previous = engine.replace_index(empty).unwrap();
    assert_eq!(previous.len(), 3);
    assert!(engine.search("near origin", 5).unwrap().is_empty());
}

#[test]
fn test_concurrent_queries_during_rebuilds() {
    let entries = random_entries(2_000, 2, 5);
    let engine = Arc::new(example_engine());
    let builder = IndexBuilder::new(dim(2), Metric::L2).with_variant(IndexVariant::Partitioned);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for _ in 0..200 {
                    let result = engine.search("wide", 3).unwrap();
                    // Either the three-point index or the rebuilt one; never a mix.
                    assert_eq!(result.len(), 3);
                    let distances: Vec<f32> =
                        result.iter().map(|hit| hit.distance.get()).collect();
                    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
                }
            });
        }

        for round in 0..3 {
            let info = engine
                .rebuild(entries.iter().map(|(id, v)| (*id, v.as_slice())), &builder)
                .unwrap();
            assert_eq!(info.documents, 2_000, "round {round}");
        }
    });

    assert_eq!(engine.info().documents, 2_000);
    assert_eq!(engine.info().variant, "partitioned");
}

#[test]
fn test_verify_corpus_detects_changed_ids() {
    let engine = example_engine();

    assert!(engine.verify_corpus(&[DocumentId::new(3), DocumentId::new(1), DocumentId::new(2)]));
    assert!(!engine.verify_corpus(&[DocumentId::new(1), DocumentId::new(2)]));
}
