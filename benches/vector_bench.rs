//! Benchmark for PersistentVector vs standard Vec.
//!
//! Compares persistent append, transient append, random access, and
//! structural update against the standard library baseline.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use seqtrie::value::Value;
use seqtrie::vector::{PersistentVector, TransientVector};
use std::hint::black_box;

// =============================================================================
// push_back Benchmark
// =============================================================================

fn benchmark_push_back(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("push_back");

    for size in [100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut vector = PersistentVector::new();
                    for index in 0..size {
                        vector = vector.push_back(black_box(Value::Int(index)));
                    }
                    black_box(vector)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("TransientVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut transient = TransientVector::new();
                    for index in 0..size {
                        transient.push_back(black_box(Value::Int(index)));
                    }
                    black_box(transient.persistent())
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("Vec", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut vector = Vec::new();
                for index in 0..size {
                    vector.push(black_box(Value::Int(index)));
                }
                black_box(vector)
            });
        });
    }

    group.finish();
}

// =============================================================================
// get Benchmark (Random Access)
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1000, 10000] {
        let persistent_vector: PersistentVector = (0..size).map(Value::Int).collect();
        let standard_vector: Vec<Value> = (0..size).map(Value::Int).collect();
        let size = usize::try_from(size).unwrap();

        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size {
                        black_box(persistent_vector.get(black_box(index)));
                    }
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("Vec", size), &size, |bencher, &size| {
            bencher.iter(|| {
                for index in 0..size {
                    black_box(standard_vector.get(black_box(index)));
                }
            });
        });
    }

    group.finish();
}

// =============================================================================
// assoc Benchmark (Structural Update)
// =============================================================================

fn benchmark_assoc(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("assoc");

    for size in [1000, 10000] {
        let vector: PersistentVector = (0..size).map(Value::Int).collect();
        let size = usize::try_from(size).unwrap();

        group.bench_with_input(
            BenchmarkId::new("PersistentVector", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let updated = vector
                        .assoc(black_box(size / 2), Value::Int(-1))
                        .unwrap();
                    black_box(updated)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_push_back, benchmark_get, benchmark_assoc);
criterion_main!(benches);
