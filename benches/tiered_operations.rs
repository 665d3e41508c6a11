//! Benchmarks for tiered cache operations
//!
//! This benchmark suite measures the performance of:
//! - Writes fanned out to one, two and three in-memory tiers
//! - Hits in the first tier
//! - Hits in the last tier, including read-repair of faster tiers
//! - Reads through a reloadable handle

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::backends::MokaCache;
use tiered_cache::{
    CacheBackend, Expiry, MapConfig, ReloadableBackendHandle, TieredCache, TieredCacheBuilder,
};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"))
}

/// Build a tiered cache of `tiers` Moka backends
fn build_cache(tiers: usize) -> (TieredCache, Vec<Arc<MokaCache>>) {
    let backends: Vec<Arc<MokaCache>> = (0..tiers).map(|_| Arc::new(MokaCache::default())).collect();
    let cache = backends
        .iter()
        .fold(TieredCacheBuilder::new(), |builder, tier| {
            builder.with_tier(tier.clone())
        })
        .build();
    (cache, backends)
}

/// Generate test data of specified size
fn test_data(size_bytes: usize) -> Bytes {
    Bytes::from("x".repeat(size_bytes))
}

/// Benchmark fan-out writes
fn bench_save(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("tiered_save");
    group.measurement_time(Duration::from_secs(5));
    let data = test_data(1024);

    for tiers in [1_usize, 2, 3] {
        let (cache, _) = build_cache(tiers);
        group.bench_with_input(BenchmarkId::new("tiers", tiers), &tiers, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let key = format!("bench:save:{}", rand::random::<u16>());
                    cache
                        .save(&key, black_box(data.clone()), Expiry::After(Duration::from_secs(300)))
                        .await
                        .unwrap_or_else(|_| panic!("Failed to save"));
                });
            });
        });
    }

    group.finish();
}

/// Benchmark hits in the first and in the last tier
fn bench_load(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("tiered_load");

    let (cache, backends) = build_cache(3);
    rt.block_on(async {
        cache
            .save("bench:hot", test_data(1024), Expiry::Never)
            .await
            .unwrap_or_else(|_| panic!("Failed to seed"));
    });

    group.bench_function("first_tier_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(cache.load("bench:hot").await.unwrap_or_default());
            });
        });
    });

    let last = backends
        .last()
        .cloned()
        .unwrap_or_else(|| panic!("No tiers"));
    group.bench_function("last_tier_hit_with_repair", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:cold:{}", rand::random::<u16>());
                last.save(&key, test_data(1024), Expiry::After(Duration::from_secs(300)))
                    .await
                    .unwrap_or_else(|_| panic!("Failed to seed"));
                black_box(cache.load(&key).await.unwrap_or_default());
            });
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(cache.load("bench:missing").await.is_err());
            });
        });
    });

    group.finish();
}

/// Benchmark the shared-lock overhead of a reloadable handle
fn bench_reloadable_handle(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reloadable_handle");

    let handle = rt.block_on(async {
        let handle = ReloadableBackendHandle::<MokaCache>::from_source(&MapConfig::new())
            .await
            .unwrap_or_else(|_| panic!("Failed to build handle"));
        handle
            .save("bench:hot", test_data(1024), Expiry::Never)
            .await
            .unwrap_or_else(|_| panic!("Failed to seed"));
        handle
    });
    let direct = MokaCache::default();
    rt.block_on(async {
        direct
            .save("bench:hot", test_data(1024), Expiry::Never)
            .await
            .unwrap_or_else(|_| panic!("Failed to seed"));
    });

    group.bench_function("direct", |b| {
        b.iter(|| rt.block_on(async { black_box(direct.load("bench:hot").await.unwrap_or_default()) }));
    });
    group.bench_function("handle", |b| {
        b.iter(|| rt.block_on(async { black_box(handle.load("bench:hot").await.unwrap_or_default()) }));
    });

    group.finish();
}

criterion_group!(benches, bench_save, bench_load, bench_reloadable_handle);
criterion_main!(benches);
