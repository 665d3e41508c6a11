//! Tiered Cache
//!
//! A uniform caching facade over swappable, stackable and live-reconfigurable
//! storage tiers:
//! - **Backends**: bounded in-memory store (Moka), Redis single node, Sentinel
//!   failover or Cluster, a no-op store and a scriptable test double
//! - **Tiered Cache**: fan-out writes, fastest-first reads with read-repair of
//!   faster tiers, aggregated partial failures
//! - **Hot Reconfiguration**: replace a backend in place (new capacity, new
//!   connection, new topology) while concurrent callers keep working
//! - **Statistics**: memory, hit/miss, key, expired and evicted counters,
//!   summed across tiers and cluster nodes, polled periodically if needed
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use std::time::Duration;
//! use tiered_cache::backends::{MokaCache, RedisCache, RedisCacheConfig};
//! use tiered_cache::{CacheBackend, Expiry, TieredCacheBuilder};
//!
//! #[tokio::main]
//! async fn main() -> tiered_cache::Result<()> {
//!     let cache = TieredCacheBuilder::new()
//!         .with_backend(MokaCache::default())
//!         .with_backend(RedisCache::connect(RedisCacheConfig::default()).await?)
//!         .build();
//!
//!     cache
//!         .save("user:1", Bytes::from_static(b"alice"), Expiry::After(Duration::from_secs(300)))
//!         .await?;
//!
//!     // Memory first, then Redis; a Redis hit is copied back into memory
//!     let value = cache.load("user:1").await?;
//!     tracing::info!(?value, "cached");
//!
//!     let stats = cache.stats().await?;
//!     tracing::info!(%stats, "cache stats");
//!
//!     cache.close().await
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! load → tier 0 (Moka) → tier 1 (Redis) → NotFound
//!        ↓ hit           ↓ hit
//!        return          copy into tier 0 with remaining TTL, return
//! ```
//!
//! Every tier implements [`CacheBackend`]; so does [`TieredCache`] itself and
//! [`ReloadableBackendHandle`], so they compose freely.

pub mod backends;
pub mod builder;
pub mod config;
pub mod error;
pub mod reload;
pub mod stats;
pub mod stats_watcher;
pub mod tiered;
pub mod traits;

pub use builder::TieredCacheBuilder;
pub use config::{ChangedKeys, ConfigSource, ConfigSourceExt, MapConfig};
pub use error::{CacheError, MultiError, Result};
pub use reload::{Reloadable, ReloadableBackendHandle};
pub use stats::Stats;
pub use stats_watcher::StatsWatcher;
pub use tiered::TieredCache;
pub use traits::{CacheBackend, Expiry, Ttl};

// Re-export async_trait for user convenience
pub use async_trait::async_trait;
