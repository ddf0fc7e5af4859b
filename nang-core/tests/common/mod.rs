//! Shared fixtures for integration tests
#![allow(dead_code)]

use nang_core::{BuildParameters, NangIndex, VectorSet, l2_distance_squared};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform random vectors in [0, 1), row-major
pub fn random_vectors(rows: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * dim).map(|_| rng.random::<f32>()).collect()
}

/// Parameters sized for a few thousand vectors
pub fn small_params() -> BuildParameters {
    BuildParameters::new(24, 32, 8, 12, 32, 16, 24, 1.0, 1.5)
}

/// Parameters from the reference 10k x 64 scenario
pub fn reference_params() -> BuildParameters {
    BuildParameters::new(200, 220, 12, 25, 200, 40, 50, 1.0, 1.0)
}

/// Index built over `data` with [`small_params`]
pub fn built_index(data: &[f32], dim: usize) -> NangIndex {
    let index = NangIndex::new();
    index
        .build_all(VectorSet::new(data, dim).unwrap(), &small_params())
        .unwrap();
    index
}

/// Exact top-k ids by scanning every row
pub fn brute_force(data: &[f32], dim: usize, query: &[f32], k: usize) -> Vec<i64> {
    let mut scored: Vec<(f32, i64)> = data
        .chunks_exact(dim)
        .enumerate()
        .map(|(id, row)| (l2_distance_squared(query, row), id as i64))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}
