//! Beam search benchmarks.
//!
//! # Benchmark Goals
//!
//! 1. Latency of a single query as the frontier `search_L` grows
//! 2. Batch throughput on the rayon pool
//! 3. Overhead of an exclusion bitset that removes a large share of ids

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nang_core::{BuildParameters, ExclusionBitset, NangIndex, SearchParameters, VectorSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

const DIM: usize = 64;
const ROWS: usize = 10_000;

fn build_benchmark_index() -> (NangIndex, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(0x5EA7C4);
    let data: Vec<f32> = (0..ROWS * DIM).map(|_| rng.random::<f32>()).collect();
    let queries: Vec<f32> = (0..100 * DIM).map(|_| rng.random::<f32>()).collect();

    let index = NangIndex::new();
    let params = BuildParameters::new(60, 80, 10, 20, 60, 32, 48, 1.0, 1.0);
    index
        .build_all(VectorSet::new(&data, DIM).expect("valid shape"), &params)
        .expect("build");
    (index, queries)
}

fn bench_search_by_frontier(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_by_frontier");
    group.sample_size(50);
    let (index, queries) = build_benchmark_index();
    let query = &queries[..DIM];

    for l_search in [10, 20, 50, 100, 200] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("search_L", l_search), &l_search, |b, &l| {
            let params = SearchParameters::new(l, 10);
            b.iter(|| black_box(index.query(query, &params, None).expect("query")));
        });
    }

    group.finish();
}

fn bench_batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_throughput");
    group.sample_size(20);
    let (index, queries) = build_benchmark_index();
    let params = SearchParameters::new(50, 10);

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_queries", |b| {
        b.iter(|| black_box(index.query(&queries, &params, None).expect("query")));
    });

    group.finish();
}

fn bench_exclusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("exclusion");
    group.sample_size(50);
    let (index, queries) = build_benchmark_index();
    let params = SearchParameters::new(50, 10);
    let query = &queries[..DIM];

    for excluded_pct in [0, 50, 90] {
        let mut bitset = ExclusionBitset::new(ROWS);
        for id in 0..ROWS * excluded_pct / 100 {
            bitset.set(id);
        }
        group.bench_with_input(
            BenchmarkId::new("excluded_pct", excluded_pct),
            &excluded_pct,
            |b, _| b.iter(|| black_box(index.query(query, &params, Some(&bitset)).expect("query"))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_search_by_frontier, bench_batch_throughput, bench_exclusion);
criterion_main!(benches);
