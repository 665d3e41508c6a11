//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! ## In-Memory
//! - **Moka** - Byte-bounded concurrent cache with per-key TTL (feature: `moka`)
//!
//! ## Distributed
//! - **Redis** - Single node, Sentinel failover or Cluster (feature: `redis`)
//!
//! ## Utility
//! - **Nop** - Stores nothing, always misses
//! - **Mock** - Scriptable test double with call counters
//!
//! # Usage
//!
//! ```rust,no_run
//! use tiered_cache::backends::{MokaCache, MokaCacheConfig, RedisCache, RedisCacheConfig};
//!
//! # async fn example() -> tiered_cache::Result<()> {
//! let memory = MokaCache::new(MokaCacheConfig { capacity_bytes: 64 * 1024 * 1024 });
//! let redis = RedisCache::connect(RedisCacheConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod mock_cache;
pub mod nop_cache;

#[cfg(feature = "moka")]
pub mod moka_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use mock_cache::MockCache;
pub use nop_cache::NopCache;

#[cfg(feature = "moka")]
pub use moka_cache::{MokaCache, MokaCacheConfig};

#[cfg(feature = "redis")]
pub use redis_cache::{RedisAuth, RedisCache, RedisCacheConfig, Topology};
