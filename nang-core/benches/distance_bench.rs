//! Squared-L2 kernel benchmarks.
//!
//! Measures the runtime-dispatched SIMD path against the portable scalar
//! loop across the dimensions NANG is typically built with.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nang_core::distance::{l2_distance_squared, l2_distance_squared_scalar};
use std::hint::black_box;

fn bench_distance_by_dimension(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_squared_by_dimension");
    group.sample_size(500);

    for dims in [16u64, 64, 128, 384, 768, 1536] {
        group.throughput(Throughput::Elements(dims));

        let a: Vec<f32> = (0..dims).map(|i| (i as f32).sin() * 0.5).collect();
        let b: Vec<f32> = (0..dims).map(|i| (i as f32).cos() * 0.5).collect();

        group.bench_with_input(BenchmarkId::new("dispatch", dims), &dims, |bench, _| {
            bench.iter(|| black_box(l2_distance_squared(black_box(&a), black_box(&b))));
        });

        group.bench_with_input(BenchmarkId::new("scalar", dims), &dims, |bench, _| {
            bench.iter(|| black_box(l2_distance_squared_scalar(black_box(&a), black_box(&b))));
        });
    }

    group.finish();
}

/// One query against a contiguous block of rows, as in a neighbor scan
fn bench_row_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_scan");
    let dims = 64;
    let rows = 200;

    let query: Vec<f32> = (0..dims).map(|i| i as f32 * 0.01).collect();
    let block: Vec<f32> = (0..dims * rows).map(|i| ((i * 7) % 113) as f32 * 0.01).collect();
    group.throughput(Throughput::Elements(rows as u64));

    group.bench_function("64d_x200", |bench| {
        bench.iter(|| {
            let mut best = f32::MAX;
            for row in block.chunks_exact(dims) {
                best = best.min(l2_distance_squared(&query, row));
            }
            black_box(best)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_distance_by_dimension, bench_row_scan);
criterion_main!(benches);
