//! Saving and loading index files.

use crate::common::{dim, example_entries, random_entries, random_vector, temp_index_path};
use docseek::error::EngineError;
use docseek::vector::{
    DocumentId, FORMAT_VERSION, IndexBuilder, IndexVariant, Metric, VectorIndex, load_index,
    load_index_unchecked, read_header, save_index,
};

fn build(variant: IndexVariant, metric: Metric) -> VectorIndex {
    IndexBuilder::new(dim(8), metric)
        .with_variant(variant)
        .with_partitions(Some(9))
        .with_probes(Some(2))
        .with_model("table-8")
        .build(random_entries(180, 8, 17))
        .unwrap()
}

#[test]
fn test_round_trip_preserves_results() {
    for (variant, metric) in [
        (IndexVariant::Flat, Metric::L2),
        (IndexVariant::Flat, Metric::Cosine),
        (IndexVariant::Partitioned, Metric::L2),
        (IndexVariant::Partitioned, Metric::Cosine),
    ] {
        let (_dir, path) = temp_index_path();
        let original = build(variant, metric);
        save_index(&original, &path).unwrap();

        let loaded = load_index(&path, dim(8), metric).unwrap();

        assert_eq!(loaded.info(), original.info());
        for seed in 0..8 {
            let query = random_vector(8, 500 + seed);
            assert_eq!(
                loaded.search(&query, 12).unwrap(),
                original.search(&query, 12).unwrap(),
                "{variant} {metric} seed {seed}"
            );
        }
    }
}

#[test]
fn test_header_describes_index_without_decoding_rows() {
    let index = build(IndexVariant::Partitioned, Metric::Cosine);
    let bytes = index.to_bytes();

    let header = read_header(&bytes).unwrap();

    assert_eq!(header.version, FORMAT_VERSION);
    assert_eq!(header.metric, Metric::Cosine);
    assert_eq!(header.dimension, dim(8));
    assert_eq!(header.count, 180);
    assert_eq!(header.model, "table-8");
}

#[test]
fn test_dimension_mismatch_on_load() {
    let (_dir, path) = temp_index_path();
    save_index(&build(IndexVariant::Flat, Metric::L2), &path).unwrap();

    let err = load_index(&path, dim(384), Metric::L2).unwrap_err();

    assert!(matches!(
        err,
        EngineError::IndexDimensionMismatch { index: 8, embedder: 384 }
    ));
}

#[test]
fn test_metric_mismatch_on_load() {
    let (_dir, path) = temp_index_path();
    save_index(&build(IndexVariant::Flat, Metric::L2), &path).unwrap();

    let err = load_index(&path, dim(8), Metric::Cosine).unwrap_err();

    assert!(matches!(
        err,
        EngineError::MetricMismatch { expected: Metric::Cosine, found: Metric::L2 }
    ));
}

#[test]
fn test_truncated_file_is_rejected() {
    let (_dir, path) = temp_index_path();
    let bytes = build(IndexVariant::Partitioned, Metric::L2).to_bytes();

    for cut in [3, 20, bytes.len() / 2, bytes.len() - 1] {
        std::fs::write(&path, &bytes[..cut]).unwrap();
        let err = load_index_unchecked(&path).unwrap_err();
        assert!(
            matches!(err, EngineError::CorruptIndex(_)),
            "cut at {cut}: {err:?}"
        );
    }
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let mut bytes = build(IndexVariant::Flat, Metric::L2).to_bytes();
    bytes.extend_from_slice(&[0, 0, 0, 0]);

    assert!(matches!(
        VectorIndex::from_bytes(&bytes),
        Err(EngineError::CorruptIndex(_))
    ));
}

#[test]
fn test_save_replaces_existing_file() {
    let (_dir, path) = temp_index_path();
    save_index(&build(IndexVariant::Flat, Metric::L2), &path).unwrap();

    let small = IndexBuilder::new(dim(2), Metric::L2)
        .build(example_entries())
        .unwrap();
    save_index(&small, &path).unwrap();

    let loaded = load_index(&path, dim(2), Metric::L2).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(
        loaded.search(&[0.1, 0.0], 1).unwrap().ids(),
        vec![DocumentId::new(1)]
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let (_dir, path) = temp_index_path();

    let err = load_index(&path, dim(8), Metric::L2).unwrap_err();

    assert!(matches!(err, EngineError::Io { .. }));
}
