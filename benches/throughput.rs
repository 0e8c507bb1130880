//! Throughput Benchmark for cacheflow
//!
//! Measures the local tier directly and the orchestrator in local-only mode.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use cacheflow::protocol::RespParser;
use cacheflow::storage::LocalStore;
use cacheflow::TieredCache;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

/// Benchmark local tier writes
fn bench_set(c: &mut Criterion) {
    let store = LocalStore::new();

    let mut group = c.benchmark_group("local_set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), "small_value".to_string(), HOUR);
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024);
        b.iter(|| {
            store.set(format!("key:{}", i), value.clone(), HOUR);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark local tier reads
fn bench_get(c: &mut Criterion) {
    let store = LocalStore::new();
    for i in 0..100_000 {
        store.set(format!("key:{}", i), format!("value:{}", i), HOUR);
    }

    let mut group = c.benchmark_group("local_get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark sweeping a store where half the entries have expired
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    group.bench_function("sweep_10k_half_expired", |b| {
        b.iter_batched(
            || {
                let store = LocalStore::new();
                for i in 0..10_000 {
                    let ttl = if i % 2 == 0 { Duration::ZERO } else { HOUR };
                    store.set(format!("key:{}", i), i, ttl);
                }
                store
            },
            |store| black_box(store.sweep()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmark the orchestrator with JSON values (80% reads, 20% writes)
fn bench_tiered(c: &mut Criterion) {
    let cache = TieredCache::<Value>::local_only(HOUR);
    tokio_test::block_on(async {
        for i in 0..10_000 {
            cache
                .set(&format!("user:{}", i), json!({"id": i, "name": "user"}), None)
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("tiered_local_only");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            tokio_test::block_on(async {
                if i % 5 == 0 {
                    let _ = cache.set(&format!("new:{}", i), json!(i), None).await;
                } else {
                    black_box(cache.get(&format!("user:{}", i % 10_000)).await);
                }
            });
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(LocalStore::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.set(key.clone(), i, HOUR);
                            store.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

/// Benchmark framing remote replies
fn bench_parse(c: &mut Criterion) {
    let reply = format!("${}\r\n{}\r\n", 512, "x".repeat(512));

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(reply.len() as u64));

    group.bench_function("bulk_512b", |b| {
        let mut parser = RespParser::new();
        b.iter(|| black_box(parser.parse(reply.as_bytes()).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_sweep,
    bench_tiered,
    bench_concurrent,
    bench_parse,
);

criterion_main!(benches);
