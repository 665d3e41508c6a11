//! Mock Cache - Test Double Backend
//!
//! A backend whose every operation can be scripted with a callback, and which
//! counts how many times each operation was called. Meant for unit tests of
//! code built on top of [`CacheBackend`].

use crate::error::{CacheError, Result};
use crate::stats::Stats;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

type SaveFn = dyn Fn(&str, &Bytes, Expiry) -> Result<()> + Send + Sync;
type LoadFn = dyn Fn(&str) -> Result<Bytes> + Send + Sync;
type TtlFn = dyn Fn(&str) -> Result<Ttl> + Send + Sync;
type StatsFn = dyn Fn() -> Result<Stats> + Send + Sync;

/// Scriptable test double
///
/// Without callbacks it behaves like an empty cache: `save` succeeds, `load`
/// returns [`CacheError::NotFound`], `ttl` returns [`Ttl::Missing`] and `stats`
/// returns zeroed [`Stats`].
///
/// **Example**:
/// ```rust
/// use tiered_cache::backends::MockCache;
/// use tiered_cache::{CacheBackend, CacheError};
/// use bytes::Bytes;
///
/// # async fn example() {
/// let mock = MockCache::new();
/// mock.set_load_callback(|key| {
///     assert_eq!(key, "user:1");
///     Ok(Bytes::from_static(b"alice"))
/// });
///
/// assert_eq!(mock.load("user:1").await.unwrap(), Bytes::from_static(b"alice"));
/// assert_eq!(mock.load_calls(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockCache {
    save_calls: AtomicUsize,
    load_calls: AtomicUsize,
    ttl_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    close_calls: AtomicUsize,
    save_callback: RwLock<Option<Box<SaveFn>>>,
    load_callback: RwLock<Option<Box<LoadFn>>>,
    ttl_callback: RwLock<Option<Box<TtlFn>>>,
    stats_callback: RwLock<Option<Box<StatsFn>>>,
}

impl MockCache {
    /// Create a mock with no callbacks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the `save` operation
    pub fn set_save_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Bytes, Expiry) -> Result<()> + Send + Sync + 'static,
    {
        *self.save_callback.write() = Some(Box::new(callback));
    }

    /// Script the `load` operation
    pub fn set_load_callback<F>(&self, callback: F)
    where
        F: Fn(&str) -> Result<Bytes> + Send + Sync + 'static,
    {
        *self.load_callback.write() = Some(Box::new(callback));
    }

    /// Script the `ttl` operation
    pub fn set_ttl_callback<F>(&self, callback: F)
    where
        F: Fn(&str) -> Result<Ttl> + Send + Sync + 'static,
    {
        *self.ttl_callback.write() = Some(Box::new(callback));
    }

    /// Script the `stats` operation
    pub fn set_stats_callback<F>(&self, callback: F)
    where
        F: Fn() -> Result<Stats> + Send + Sync + 'static,
    {
        *self.stats_callback.write() = Some(Box::new(callback));
    }

    /// Number of `save` calls so far
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of `load` calls so far
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `ttl` calls so far
    pub fn ttl_calls(&self) -> usize {
        self.ttl_calls.load(Ordering::SeqCst)
    }

    /// Number of `stats` calls so far
    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for MockCache {
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        match self.save_callback.read().as_ref() {
            Some(callback) => callback(key, &value, expiry),
            None => Ok(()),
        }
    }

    async fn load(&self, key: &str) -> Result<Bytes> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        match self.load_callback.read().as_ref() {
            Some(callback) => callback(key),
            None => Err(CacheError::NotFound),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        self.ttl_calls.fetch_add(1, Ordering::SeqCst);
        match self.ttl_callback.read().as_ref() {
            Some(callback) => callback(key),
            None => Ok(Ttl::Missing),
        }
    }

    async fn stats(&self) -> Result<Stats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        match self.stats_callback.read().as_ref() {
            Some(callback) => callback(),
            None => Ok(Stats::default()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
