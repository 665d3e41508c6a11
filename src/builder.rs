//! Tiered Cache Builder
//!
//! Provides a builder pattern for constructing a [`TieredCache`] from any mix
//! of backends.
//!
//! # Example: Memory in Front of Redis
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiered_cache::backends::{MokaCache, RedisCache, RedisCacheConfig};
//! use tiered_cache::TieredCacheBuilder;
//!
//! # async fn example() -> tiered_cache::Result<()> {
//! let cache = TieredCacheBuilder::new()
//!     .with_backend(MokaCache::default())
//!     .with_backend(RedisCache::connect(RedisCacheConfig::default()).await?)
//!     .build();
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use tiered_cache::TieredCacheBuilder;
//! use std::sync::Arc;
//!
//! let custom = Arc::new(MyCustomCache::new());
//!
//! let cache = TieredCacheBuilder::new()
//!     .with_tier(custom)
//!     .build();
//! ```

use crate::tiered::TieredCache;
use crate::traits::CacheBackend;
use std::sync::Arc;
use tracing::info;

/// Builder for constructing a [`TieredCache`]
///
/// Tiers are kept in the order they are added: the first one is the fastest
/// and is consulted first on reads.
#[derive(Default)]
pub struct TieredCacheBuilder {
    tiers: Vec<Arc<dyn CacheBackend>>,
}

impl TieredCacheBuilder {
    /// Create a builder with no tiers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shared backend as the next (slower) tier
    ///
    /// Use this to share one backend, or a
    /// [`ReloadableBackendHandle`](crate::ReloadableBackendHandle), between
    /// the tiered cache and other owners.
    #[must_use]
    pub fn with_tier(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.tiers.push(backend);
        self
    }

    /// Append an owned backend as the next (slower) tier
    #[must_use]
    pub fn with_backend<B: CacheBackend + 'static>(self, backend: B) -> Self {
        self.with_tier(Arc::new(backend))
    }

    /// Build the tiered cache
    #[must_use]
    pub fn build(self) -> TieredCache {
        let names: Vec<&str> = self.tiers.iter().map(|tier| tier.name()).collect();
        info!(tiers = ?names, "Tiered cache built");
        TieredCache::new(self.tiers)
    }
}
