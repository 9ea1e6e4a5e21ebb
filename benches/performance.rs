//! Performance benchmarks for the collection store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use satchel::Store;
use serde_json::json;

/// Benchmark whole-collection reads at varying collection sizes.
///
/// Every mutation rewrites the full array, so read/write cost growing with
/// collection size is the tradeoff this design accepts.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("collection_size", size), &size, |b, &n| {
            let store = Store::in_memory().unwrap();
            for i in 0..n {
                store
                    .append("records", &json!({"id": format!("r{i}"), "n": i}))
                    .unwrap();
            }

            b.iter(|| {
                black_box(store.read::<serde_json::Value>("records", Vec::new()));
            });
        });
    }

    group.finish();
}

/// Benchmark appends against a growing collection.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("collection_size", size), &size, |b, &n| {
            let store = Store::in_memory().unwrap();
            for i in 0..n {
                store
                    .append("records", &json!({"id": format!("r{i}")}))
                    .unwrap();
            }

            let mut next = n;
            b.iter(|| {
                store
                    .append("records", &json!({"id": format!("r{next}")}))
                    .unwrap();
                next += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark same-process fan-out at varying subscriber counts.
fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for subscribers in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &n| {
                let store = Store::in_memory().unwrap();
                let handles: Vec<_> = (0..n)
                    .map(|_| store.subscribe("tick", |payload| {
                        black_box(payload);
                    }))
                    .collect();

                b.iter(|| {
                    store.publish("tick", json!({"n": 1})).unwrap();
                });

                for handle in handles {
                    handle.unsubscribe();
                }
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_read, bench_append, bench_publish);
criterion_main!(benches);
