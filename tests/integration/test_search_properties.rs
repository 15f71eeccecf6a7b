//! Ranking properties of flat and partitioned indexes.

use crate::common::{brute_force, dim, example_entries, random_entries, random_vector};
use docseek::error::EngineError;
use docseek::vector::{DocumentId, IndexBuilder, IndexVariant, Metric, SearchResult, VectorIndex};

fn flat(entries: &[(DocumentId, Vec<f32>)], dimension: usize, metric: Metric) -> VectorIndex {
    IndexBuilder::new(dim(dimension), metric)
        .with_variant(IndexVariant::Flat)
        .build(entries.iter().map(|(id, v)| (*id, v.as_slice())))
        .unwrap()
}

fn partitioned(
    entries: &[(DocumentId, Vec<f32>)],
    dimension: usize,
    partitions: usize,
    probes: usize,
    seed: u64,
) -> VectorIndex {
    IndexBuilder::new(dim(dimension), Metric::L2)
        .with_variant(IndexVariant::Partitioned)
        .with_partitions(Some(partitions))
        .with_probes(Some(probes))
        .with_seed(seed)
        .build(entries.iter().map(|(id, v)| (*id, v.as_slice())))
        .unwrap()
}

fn assert_sorted(result: &SearchResult) {
    let distances: Vec<f32> = result.iter().map(|hit| hit.distance.get()).collect();
    assert!(
        distances.windows(2).all(|w| w[0] <= w[1]),
        "distances not ascending: {distances:?}"
    );
}

#[test]
fn test_three_point_example() {
    let index = flat(&example_entries(), 2, Metric::L2);

    let result = index.search(&[0.1, 0.0], 2).unwrap();

    assert_eq!(result.ids(), vec![DocumentId::new(1), DocumentId::new(2)]);
    let hits = result.hits();
    assert!((hits[0].distance.get() - 0.1).abs() < 1e-6);
    assert!((hits[1].distance.get() - 0.9).abs() < 1e-6);
}

#[test]
fn test_flat_matches_brute_force() {
    let entries = random_entries(300, 16, 7);
    for metric in [Metric::L2, Metric::Cosine] {
        let index = flat(&entries, 16, metric);
        for seed in 0..10 {
            let query = random_vector(16, 1_000 + seed);
            let expected = brute_force(&entries, &query, 10, metric);
            let actual: Vec<(DocumentId, f32)> = index
                .search(&query, 10)
                .unwrap()
                .iter()
                .map(|hit| (hit.id, hit.distance.get()))
                .collect();
            assert_eq!(actual, expected, "metric {metric} seed {seed}");
        }
    }
}

#[test]
fn test_result_length_is_min_of_k_and_corpus() {
    let entries = random_entries(40, 8, 3);
    let indexes = [flat(&entries, 8, Metric::L2), partitioned(&entries, 8, 6, 1, 42)];
    let query = random_vector(8, 99);

    for index in &indexes {
        for k in [1, 5, 39, 40, 41, 500] {
            let result = index.search(&query, k).unwrap();
            assert_eq!(result.len(), k.min(40), "{} k={k}", index.variant_name());
            assert_sorted(&result);
        }
    }
}

#[test]
fn test_partitioned_hits_are_distinct_corpus_members() {
    let entries = random_entries(500, 12, 11);
    let index = partitioned(&entries, 12, 20, 3, 42);

    let result = index.search(&random_vector(12, 5), 25).unwrap();

    assert_eq!(result.len(), 25);
    assert_sorted(&result);
    let mut ids = result.ids();
    assert!(ids.iter().all(|id| index.contains(*id)));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 25);
}

#[test]
fn test_probing_every_partition_is_exact() {
    let entries = random_entries(400, 8, 21);
    let index = partitioned(&entries, 8, 10, 10, 42);

    for seed in 0..5 {
        let query = random_vector(8, 2_000 + seed);
        let expected: Vec<DocumentId> = brute_force(&entries, &query, 15, Metric::L2)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(index.search(&query, 15).unwrap().ids(), expected);
    }
}

#[test]
fn test_partitioned_build_is_deterministic_for_seed() {
    let entries = random_entries(600, 8, 4);
    let first = partitioned(&entries, 8, 16, 2, 1234);
    let second = partitioned(&entries, 8, 16, 2, 1234);

    assert_eq!(first.info().largest_partition, second.info().largest_partition);
    for seed in 0..5 {
        let query = random_vector(8, 300 + seed);
        assert_eq!(
            first.search(&query, 10).unwrap(),
            second.search(&query, 10).unwrap()
        );
    }
}

#[test]
fn test_repeated_queries_are_identical() {
    let entries = random_entries(250, 8, 8);
    let index = partitioned(&entries, 8, 12, 2, 42);
    let query = random_vector(8, 77);

    let first = index.search(&query, 7).unwrap();
    for _ in 0..5 {
        assert_eq!(index.search(&query, 7).unwrap(), first);
    }
}

#[test]
fn test_empty_index_returns_nothing() {
    let index = IndexBuilder::new(dim(4), Metric::L2)
        .build(Vec::<(DocumentId, Vec<f32>)>::new())
        .unwrap();

    assert!(index.is_empty());
    for k in [0, 1, 10] {
        assert!(index.search(&[0.0; 4], k).unwrap().is_empty());
    }
}

#[test]
fn test_duplicate_id_fails_build() {
    let mut entries = example_entries();
    entries.push((DocumentId::new(2), vec![3.0, 3.0]));

    let err = IndexBuilder::new(dim(2), Metric::L2)
        .build(entries)
        .unwrap_err();

    assert!(matches!(err, EngineError::DuplicateDocumentId(id) if id == DocumentId::new(2)));
}

#[test]
fn test_query_dimension_mismatch_is_rejected() {
    let index = flat(&example_entries(), 2, Metric::L2);

    let err = index.search(&[0.0, 0.0, 0.0], 1).unwrap_err();

    assert!(matches!(
        err,
        EngineError::DimensionMismatch { expected: 2, actual: 3 }
    ));
}
