//! Query behavior: padding, exclusion, ordering and recall.

mod common;

use common::{brute_force, built_index, random_vectors, reference_params};
use nang_core::{
    ExclusionBitset, NangIndex, PLACEHOLDER_DISTANCE, SENTINEL_ID, SearchParameters, VectorSet,
};
use std::collections::HashSet;

#[test]
fn test_topk_larger_than_index_is_padded() {
    let data = random_vectors(6, 64, 11);
    let index = NangIndex::new();
    index.build_all(VectorSet::new(&data, 64).unwrap(), &reference_params()).unwrap();

    let results = index.query(&data[..64], &SearchParameters::new(20, 10), None).unwrap();
    let row = &results[0];
    assert_eq!(row.len(), 10);
    assert_eq!(row.valid_count(), 6);

    let ids = row.ids();
    let found: HashSet<i64> = ids[..6].iter().copied().collect();
    assert_eq!(found, (0..6).collect());
    assert!(ids[6..].iter().all(|&id| id == SENTINEL_ID));
    assert!(row.distances()[6..].iter().all(|&d| d == PLACEHOLDER_DISTANCE));
}

#[test]
fn test_excluded_ids_never_returned() {
    const NQ: usize = 10;
    let data = random_vectors(2000, 16, 12);
    let index = built_index(&data, 16);

    let mut bitset = ExclusionBitset::new(2000);
    for id in 0..NQ {
        bitset.set(id);
    }

    // Query with the excluded vectors themselves: each one's true nearest
    // neighbor is itself and must be skipped
    let results =
        index.query(&data[..NQ * 16], &SearchParameters::new(40, 10), Some(&bitset)).unwrap();
    for row in &results {
        assert_eq!(row.valid_count(), 10);
        assert!(row.ids().iter().all(|&id| id >= NQ as i64));
    }
}

#[test]
fn test_exclusion_shorter_than_index() {
    let data = random_vectors(500, 8, 13);
    let index = built_index(&data, 8);

    // Ids past the bitset's end are not excluded
    let mut bitset = ExclusionBitset::new(3);
    bitset.set(2);
    let results = index.query(&data[2 * 8..3 * 8], &SearchParameters::new(32, 5), Some(&bitset)).unwrap();
    assert!(!results[0].ids().contains(&2));
    assert_eq!(results[0].valid_count(), 5);
}

#[test]
fn test_results_ascending_and_unique() {
    let data = random_vectors(1500, 12, 14);
    let queries = random_vectors(25, 12, 15);
    let index = built_index(&data, 12);

    for row in index.query(&queries, &SearchParameters::new(50, 20), None).unwrap() {
        let distances = row.distances();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        let unique: HashSet<i64> = row.ids().into_iter().collect();
        assert_eq!(unique.len(), 20);
    }
}

#[test]
fn test_batch_order_independence() {
    let data = random_vectors(1000, 8, 16);
    let queries = random_vectors(30, 8, 17);
    let index = built_index(&data, 8);
    let params = SearchParameters::new(24, 8);

    let forward = index.query(&queries, &params, None).unwrap();

    let reversed: Vec<f32> = queries.chunks_exact(8).rev().flatten().copied().collect();
    let mut backward = index.query(&reversed, &params, None).unwrap();
    backward.reverse();

    assert_eq!(forward, backward);

    // One at a time gives the same rows as the batch
    for (i, expected) in forward.iter().enumerate() {
        let single = index.query(&queries[i * 8..(i + 1) * 8], &params, None).unwrap();
        assert_eq!(&single[0], expected);
    }
}

#[test]
fn test_base_vectors_find_themselves() {
    let data = random_vectors(1500, 16, 18);
    let index = built_index(&data, 16);

    let results = index.query(&data[..100 * 16], &SearchParameters::new(32, 1), None).unwrap();
    let hits = results
        .iter()
        .enumerate()
        .filter(|(i, row)| row.ids()[0] == *i as i64)
        .count();
    assert!(hits >= 95, "only {hits}/100 base vectors found themselves");
}

#[test]
fn test_recall_against_brute_force() {
    const DIM: usize = 16;
    const K: usize = 10;
    let data = random_vectors(3000, DIM, 19);
    let queries = random_vectors(50, DIM, 20);
    let index = built_index(&data, DIM);

    let results = index.query(&queries, &SearchParameters::new(128, K as i64), None).unwrap();
    let mut found = 0;
    for (query, row) in queries.chunks_exact(DIM).zip(&results) {
        let truth: HashSet<i64> = brute_force(&data, DIM, query, K).into_iter().collect();
        found += row.ids().iter().filter(|id| truth.contains(id)).count();
    }
    let recall = found as f64 / (50 * K) as f64;
    assert!(recall >= 0.8, "recall@{K} = {recall:.3}");
}

#[test]
fn test_narrow_frontier_is_widened_to_topk() {
    let data = random_vectors(800, 8, 21);
    let index = built_index(&data, 8);

    let results = index.query(&data[..8], &SearchParameters::new(1, 15), None).unwrap();
    assert_eq!(results[0].valid_count(), 15);
}
