//! Moka Cache - In-Memory Cache Backend
//!
//! Bounded in-process store using Moka, sized in bytes rather than entries.

use crate::config::{ConfigSource, ConfigSourceExt};
use crate::error::{CacheError, Result};
use crate::stats::Stats;
use anyhow::anyhow;
use bytes::Bytes;
use moka::future::Cache;
use moka::notification::RemovalCause;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration key holding the capacity in bytes
pub const MEMORY_CFG_KEY_CAPACITY: &str = "cache.memory.capacity_bytes";

/// Smallest capacity accepted, smaller values are raised to it
pub const MIN_CAPACITY_BYTES: u64 = 512 * 1024;

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY_BYTES: u64 = 10 * 1024 * 1024;

const BACKEND: &str = "Moka";

/// Cache entry with TTL information
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Bytes,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            ttl,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn remaining(&self) -> Ttl {
        match self.expires_at {
            None => Ttl::Persistent,
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Ttl::Remaining(left),
                _ => Ttl::Missing,
            },
        }
    }
}

/// Per-entry expiration policy: every write restarts the entry's own TTL
struct EntryExpiry;

impl moka::Expiry<String, MemoryEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Configuration for `MokaCache`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MokaCacheConfig {
    /// Maximum total size of keys and values, in bytes
    pub capacity_bytes: u64,
}

impl MokaCacheConfig {
    /// Capacity actually used, never below [`MIN_CAPACITY_BYTES`]
    #[must_use]
    pub fn effective_capacity(&self) -> u64 {
        self.capacity_bytes.max(MIN_CAPACITY_BYTES)
    }
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

/// Moka in-memory cache with per-key TTL support
///
/// This is the usual fastest tier of a [`TieredCache`](crate::TieredCache):
/// - Capacity bounded by the byte size of keys plus values
/// - Per-key TTL, including entries that never expire
/// - Hit/miss, expired and evicted counters
pub struct MokaCache {
    /// Moka cache instance
    cache: Cache<String, MemoryEntry>,
    /// Effective capacity in bytes
    capacity: u64,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Entries removed because their TTL ran out
    expired: Arc<AtomicU64>,
    /// Entries removed to make room
    evicted: Arc<AtomicU64>,
}

impl MokaCache {
    /// Create new Moka cache
    #[must_use]
    pub fn new(config: MokaCacheConfig) -> Self {
        let capacity = config.effective_capacity();
        let expired = Arc::new(AtomicU64::new(0));
        let evicted = Arc::new(AtomicU64::new(0));

        let listener_expired = Arc::clone(&expired);
        let listener_evicted = Arc::clone(&evicted);
        let cache = Cache::builder()
            .max_capacity(capacity)
            .weigher(|key: &String, entry: &MemoryEntry| {
                u32::try_from(key.len() + entry.value.len()).unwrap_or(u32::MAX)
            })
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _entry, cause| match cause {
                RemovalCause::Expired => {
                    listener_expired.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Size => {
                    listener_evicted.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Explicit | RemovalCause::Replaced => {}
            })
            .build();

        info!(capacity_bytes = capacity, "[Moka] Cache initialized");

        Self {
            cache,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired,
            evicted,
        }
    }

    /// Effective capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(MokaCacheConfig::default())
    }
}

// ===== Trait Implementations =====

use crate::reload::Reloadable;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for MokaCache {
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
        let ttl = match expiry {
            Expiry::Delete => {
                self.cache.invalidate(key).await;
                debug!(key = %key, "[Moka] Deleted key");
                return Ok(());
            }
            Expiry::Never => None,
            Expiry::After(_) => expiry.whole_secs().map(Duration::from_secs),
        };

        // Moka silently drops entries heavier than the whole cache
        let size = u64::try_from(key.len() + value.len()).unwrap_or(u64::MAX);
        if size > self.capacity {
            warn!(key = %key, size, capacity = self.capacity, "[Moka] Entry larger than cache, rejected");
            return Err(CacheError::backend(
                BACKEND,
                anyhow!("entry of {size} bytes exceeds cache capacity of {} bytes", self.capacity),
            ));
        }

        self.cache
            .insert(key.to_string(), MemoryEntry::new(value, ttl))
            .await;
        debug!(key = %key, ttl_secs = ?ttl.map(|t| t.as_secs()), "[Moka] Cached key");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Bytes> {
        match self.cache.get(key).await {
            Some(entry) if entry.remaining().is_present() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(entry.value)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::NotFound)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        Ok(self
            .cache
            .get(key)
            .await
            .map_or(Ttl::Missing, |entry| entry.remaining()))
    }

    async fn stats(&self) -> Result<Stats> {
        self.cache.run_pending_tasks().await;
        Ok(Stats {
            memory_used: self.cache.weighted_size(),
            memory_max: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            key_count: self.cache.entry_count(),
            expired_count: self.expired.load(Ordering::Relaxed),
            evicted_count: self.evicted.load(Ordering::Relaxed),
        })
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[async_trait]
impl Reloadable for MokaCache {
    type Config = MokaCacheConfig;

    fn config_keys() -> &'static [&'static str] {
        &[MEMORY_CFG_KEY_CAPACITY]
    }

    fn read_config(source: &dyn ConfigSource) -> MokaCacheConfig {
        let requested = source.get_or(MEMORY_CFG_KEY_CAPACITY, DEFAULT_CAPACITY_BYTES);
        MokaCacheConfig {
            capacity_bytes: requested.max(MIN_CAPACITY_BYTES),
        }
    }

    async fn build(config: &MokaCacheConfig) -> Result<Self> {
        Ok(Self::new(*config))
    }

    /// Re-home every live entry with its remaining TTL. Entries that expired
    /// in the meantime are dropped.
    async fn migrate_from(&self, old: &Self) {
        let entries: Vec<_> = old.cache.iter().collect();
        let mut moved = 0_usize;
        for (key, entry) in entries {
            let ttl = match entry.remaining() {
                Ttl::Missing => continue,
                Ttl::Persistent => None,
                Ttl::Remaining(left) => Some(left),
            };
            self.cache
                .insert(key.as_ref().clone(), MemoryEntry::new(entry.value, ttl))
                .await;
            moved += 1;
        }
        info!(
            moved,
            from_capacity = old.capacity,
            to_capacity = self.capacity,
            "[Moka] Migrated entries to resized cache"
        );
    }
}
