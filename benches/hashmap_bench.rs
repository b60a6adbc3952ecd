//! Benchmark for PersistentHashMap vs standard HashMap.
//!
//! Compares persistent insert, transient insert, and lookup against the
//! standard library baseline.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use seqtrie::hashmap::{PersistentHashMap, TransientHashMap};
use seqtrie::value::Value;
use std::collections::HashMap;
use std::hint::black_box;

// =============================================================================
// insert Benchmark
// =============================================================================

fn benchmark_insert(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("insert");

    for size in [100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("PersistentHashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = PersistentHashMap::new();
                    for index in 0..size {
                        map = map.insert(black_box(Value::Int(index)), Value::Int(index));
                    }
                    black_box(map)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("TransientHashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut transient = TransientHashMap::new();
                    for index in 0..size {
                        transient.insert(black_box(Value::Int(index)), Value::Int(index));
                    }
                    black_box(transient.persistent())
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("HashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = HashMap::new();
                    for index in 0..size {
                        map.insert(black_box(index), index);
                    }
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1000, 10000] {
        let persistent_map: PersistentHashMap = (0..size)
            .map(|index| (Value::Int(index), Value::Int(index)))
            .collect();
        let standard_map: HashMap<i64, i64> = (0..size).map(|index| (index, index)).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentHashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size {
                        black_box(persistent_map.get(black_box(&Value::Int(index))));
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("HashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for index in 0..size {
                        black_box(standard_map.get(black_box(&index)));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_insert, benchmark_get);
criterion_main!(benches);
