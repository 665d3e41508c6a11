//! Tiered Cache - Ordered Composition of Backends
//!
//! Reads go through the tiers fastest first; a hit in a slower tier is copied
//! back into every faster one. Writes go to every tier. Each tier is called at
//! most once per operation and failures of independent tiers are collected
//! into one [`MultiError`].
//!
//! ```text
//! load(key) → tier 0 (miss) → tier 1 (miss) → tier 2 (hit)
//!                                               ↓ ttl(key)
//!             tier 0 ← save ← tier 1 ← save ←───┘  (read-repair, best effort)
//! ```

use crate::error::{CacheError, MultiError, Result};
use crate::stats::Stats;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache composed of an ordered list of backends
///
/// Index 0 is the fastest tier. The list is fixed at construction; build one
/// with [`TieredCacheBuilder`](crate::TieredCacheBuilder) or [`TieredCache::new`].
///
/// Error policy:
/// - `load` treats [`CacheError::NotFound`] as a plain miss. Any other tier
///   failure is recorded and, when no tier has the key, reported instead of
///   `NotFound`: a failure beats a clean miss.
/// - `stats` is all or nothing, one failing tier fails the whole call.
pub struct TieredCache {
    tiers: Vec<Arc<dyn CacheBackend>>,
}

impl TieredCache {
    /// Compose `tiers`, fastest first
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self { tiers }
    }

    /// The composed tiers, fastest first
    #[must_use]
    pub fn tiers(&self) -> &[Arc<dyn CacheBackend>] {
        &self.tiers
    }

    /// Copy a value found in tier `winner` into every faster tier, slowest
    /// first, using the winner's remaining TTL. Failures are only logged.
    async fn repair(&self, key: &str, value: &Bytes, winner: usize, source: &dyn CacheBackend) {
        let ttl = match source.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(key = %key, tier = winner, error = %e, "[Tiered] TTL lookup failed, skipping read-repair");
                return;
            }
        };
        let expiry = Expiry::from(ttl);

        let faster = self.tiers.get(..winner).unwrap_or_default();
        for (index, tier) in faster.iter().enumerate().rev() {
            if let Err(e) = tier.save(key, value.clone(), expiry).await {
                warn!(key = %key, tier = index, backend = tier.name(), error = %e, "[Tiered] Read-repair write failed");
            }
        }
        debug!(key = %key, from_tier = winner, ?expiry, "[Tiered] Read-repaired faster tiers");
    }
}

// ===== Trait Implementations =====

#[async_trait]
impl CacheBackend for TieredCache {
    /// Save into every tier in order. Partial writes are not rolled back.
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
        let mut errors = MultiError::new();
        for tier in &self.tiers {
            if let Err(e) = tier.save(key, value.clone(), expiry).await {
                errors.push(e);
            }
        }
        errors.into_result()
    }

    async fn load(&self, key: &str) -> Result<Bytes> {
        let mut errors = MultiError::new();
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.load(key).await {
                Ok(value) => {
                    if index > 0 {
                        self.repair(key, &value, index, tier.as_ref()).await;
                    }
                    return Ok(value);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    debug!(key = %key, tier = index, error = %e, "[Tiered] Tier load failed, trying next");
                    errors.push(e);
                }
            }
        }

        errors.into_result()?;
        Err(CacheError::NotFound)
    }

    /// First tier that knows the key wins, including "no expiry". When none
    /// does, tier failures are reported if there were any.
    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let mut errors = MultiError::new();
        for tier in &self.tiers {
            match tier.ttl(key).await {
                Ok(ttl) if ttl.is_present() => return Ok(ttl),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
        errors.into_result().map(|()| Ttl::Missing)
    }

    async fn stats(&self) -> Result<Stats> {
        let mut errors = MultiError::new();
        let mut total = Stats::default();
        for tier in &self.tiers {
            match tier.stats().await {
                Ok(stats) => total += stats,
                Err(e) => errors.push(e),
            }
        }
        errors.into_result()?;
        Ok(total)
    }

    async fn close(&self) -> Result<()> {
        let mut errors = MultiError::new();
        for tier in &self.tiers {
            if let Err(e) = tier.close().await {
                errors.push(e);
            }
        }
        errors.into_result()
    }

    fn name(&self) -> &'static str {
        "Tiered"
    }
}
