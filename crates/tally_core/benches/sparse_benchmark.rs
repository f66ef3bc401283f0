//! # Sparse Set Benchmark
//!
//! Measures the identity index hot paths:
//! 1. Minting fresh ids
//! 2. Recycling after bulk removal
//! 3. Random lookups through generational handles
//! 4. Dense iteration over alive payloads

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tally_core::{Id, SparseSet};

const ID_COUNT: usize = 100_000;

/// Generate deterministic "random" positions
fn scrambled_positions(count: usize, max: usize, seed: u64) -> Vec<usize> {
    let mut positions = Vec::with_capacity(count);
    let mut state = seed;

    for _ in 0..count {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        positions.push((state as usize) % max);
    }

    positions
}

// =============================================================================
// ALLOCATION
// =============================================================================

fn bench_new_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_new_id");

    for count in [1_000, 10_000, ID_COUNT] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut set: SparseSet<u64> = SparseSet::new();
                for _ in 0..count {
                    black_box(set.new_id());
                }
                black_box(set.count())
            });
        });
    }

    group.finish();
}

fn bench_recycle(c: &mut Criterion) {
    let mut set: SparseSet<u64> = SparseSet::new();
    set.new_ids(ID_COUNT);

    c.bench_function("sparse_remove_then_recycle_100K", |b| {
        b.iter(|| {
            let alive: Vec<Id> = set.ids().to_vec();
            for id in alive {
                set.remove(id);
            }
            for _ in 0..ID_COUNT {
                black_box(set.new_id());
            }
        });
    });
}

// =============================================================================
// LOOKUP & ITERATION
// =============================================================================

fn bench_random_get(c: &mut Criterion) {
    let mut set: SparseSet<u64> = SparseSet::new();
    let ids: Vec<Id> = (0..ID_COUNT)
        .map(|i| {
            let (id, value) = set.add();
            *value = i as u64;
            id
        })
        .collect();
    let positions = scrambled_positions(ID_COUNT, ID_COUNT, 0xDEAD_BEEF);

    c.bench_function("sparse_random_get_100K", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &position in &positions {
                if let Some(value) = set.get(ids[position]) {
                    sum = sum.wrapping_add(*value);
                }
            }
            black_box(sum)
        });
    });
}

fn bench_dense_iter(c: &mut Criterion) {
    let mut set: SparseSet<u64> = SparseSet::new();
    for i in 0..ID_COUNT {
        let (_, value) = set.add();
        *value = i as u64;
    }

    c.bench_function("sparse_dense_iter_100K", |b| {
        b.iter(|| {
            let sum = set.iter().fold(0u64, |acc, (_, value)| acc.wrapping_add(*value));
            black_box(sum)
        });
    });
}

criterion_group!(
    benches,
    bench_new_ids,
    bench_recycle,
    bench_random_get,
    bench_dense_iter
);
criterion_main!(benches);
