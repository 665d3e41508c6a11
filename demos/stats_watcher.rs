//! Tiered cache with live resizing and periodic stats logging
//!
//! ```text
//! RUST_LOG=info cargo run --example stats_watcher
//! ```

use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::backends::moka_cache::MEMORY_CFG_KEY_CAPACITY;
use tiered_cache::backends::MokaCache;
use tiered_cache::{
    CacheBackend, Expiry, MapConfig, ReloadableBackendHandle, StatsWatcher, TieredCacheBuilder,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> tiered_cache::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Arc::new(MapConfig::new());
    let memory = Arc::new(ReloadableBackendHandle::<MokaCache>::from_source(config.as_ref()).await?);
    let cancel = CancellationToken::new();
    let listener = Arc::clone(&memory).spawn_change_listener(
        config.clone(),
        config.subscribe(),
        cancel.clone(),
    );

    let cache = Arc::new(
        TieredCacheBuilder::new()
            .with_tier(memory.clone())
            .with_backend(MokaCache::default())
            .build(),
    );

    let watcher = StatsWatcher::new(cache.clone(), Duration::from_millis(500));
    watcher.watch(cancel.clone(), |result| match result {
        Ok(stats) => tracing::info!(%stats, "cache stats"),
        Err(e) => tracing::warn!(error = %e, "cache stats unavailable"),
    });

    for i in 0..1_000_u32 {
        let key = format!("item:{i}");
        cache
            .save(&key, Bytes::from(format!("value {i}")), Expiry::After(Duration::from_secs(60)))
            .await?;
        if i % 3 == 0 {
            cache.load(&key).await?;
        }
    }
    tokio::time::sleep(Duration::from_millis(1200)).await;

    tracing::info!("Growing the memory tier");
    config.set(MEMORY_CFG_KEY_CAPACITY, json!(64 * 1024 * 1024));
    tokio::time::sleep(Duration::from_millis(1200)).await;

    watcher.close().await;
    cancel.cancel();
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "config listener ended abnormally");
    }
    cache.close().await
}
