//! Cache Backend Traits
//!
//! This module defines the contract every cache tier implements, plus the
//! value types describing expiration.
//!
//! # Architecture
//!
//! - `CacheBackend`: the four-operation contract (save, load, ttl, stats) plus close
//! - `Expiry`: how long a saved entry lives (or whether the save is a delete)
//! - `Ttl`: remaining lifetime of a stored entry
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use tiered_cache::{async_trait, CacheBackend, CacheError, Expiry, Result, Stats, Ttl};
//! use bytes::Bytes;
//!
//! struct MyCustomCache {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl CacheBackend for MyCustomCache {
//!     async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
//!         // Your implementation
//!     }
//!
//!     async fn load(&self, key: &str) -> Result<Bytes> {
//!         // Return Err(CacheError::NotFound) when the key is absent
//!     }
//!
//!     async fn ttl(&self, key: &str) -> Result<Ttl> {
//!         // Your implementation
//!     }
//!
//!     async fn stats(&self) -> Result<Stats> {
//!         // Your implementation
//!     }
//! }
//! ```

use crate::error::Result;
use crate::stats::Stats;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Expiration requested when saving an entry
///
/// Mirrors the signed-duration convention of the cache contract: zero means the
/// entry never expires, a positive duration is a relative time-to-live and a
/// negative one turns the save into a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// Keep the entry until it is evicted or deleted
    Never,
    /// Expire the entry after the given duration
    After(Duration),
    /// Remove the key instead of storing a value
    Delete,
}

impl Expiry {
    /// Build from signed seconds (`0` never, `> 0` after, `< 0` delete)
    #[must_use]
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Self::Never,
            s if s > 0 => Self::After(Duration::from_secs(s.unsigned_abs())),
            _ => Self::Delete,
        }
    }

    /// Whole seconds for stores with second granularity.
    ///
    /// A positive duration shorter than one second is rounded up to one second
    /// so it is never mistaken for "no expiry". `None` for `Never`/`Delete`.
    #[must_use]
    pub fn whole_secs(&self) -> Option<u64> {
        match self {
            Self::After(ttl) => Some(ttl.as_secs().max(1)),
            Self::Never | Self::Delete => None,
        }
    }

    /// `true` if this save is a deletion
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        if ttl.is_zero() {
            Self::Never
        } else {
            Self::After(ttl)
        }
    }
}

impl From<Ttl> for Expiry {
    /// Used when copying an entry between tiers. A key that vanished between
    /// the read and the TTL lookup becomes a delete.
    fn from(ttl: Ttl) -> Self {
        match ttl {
            Ttl::Missing => Self::Delete,
            Ttl::Persistent => Self::Never,
            Ttl::Remaining(left) => Self::After(left),
        }
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// The key does not exist
    Missing,
    /// The key exists and has no expiration
    Persistent,
    /// The key exists and expires after the given duration
    Remaining(Duration),
}

impl Ttl {
    /// `true` unless the key is missing
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// Remaining duration, if the key expires at all
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Remaining(left) => Some(*left),
            Self::Missing | Self::Persistent => None,
        }
    }
}

/// Core cache backend trait implemented by every tier
///
/// This trait defines the essential operations that any cache backend must support.
/// Implement it to plug a custom store into a [`TieredCache`](crate::TieredCache)
/// or wrap it in a [`ReloadableBackendHandle`](crate::ReloadableBackendHandle).
///
/// # Required Operations
///
/// - `save`: Store (or delete) a value
/// - `load`: Retrieve a value, [`CacheError::NotFound`](crate::CacheError::NotFound) when absent
/// - `ttl`: Remaining lifetime of a key
/// - `stats`: Memory and key statistics
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to support concurrent access across async tasks.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store `value` under `key`
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The value to store
    /// * `expiry` - How long to keep it; [`Expiry::Delete`] removes the key
    ///
    /// # Errors
    ///
    /// Returns an error if the key could not be saved.
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()>;

    /// Get value from cache by key
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`](crate::CacheError::NotFound) if the key
    /// does not exist, or a backend failure.
    async fn load(&self, key: &str) -> Result<Bytes>;

    /// Remaining time-to-live of a key
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be queried. A missing key is
    /// `Ok(Ttl::Missing)`, not an error.
    async fn ttl(&self, key: &str) -> Result<Ttl>;

    /// Memory, hit/miss and key statistics
    ///
    /// # Errors
    ///
    /// Returns an error if statistics could not be retrieved.
    async fn stats(&self) -> Result<Stats>;

    /// Release resources held by the backend (connections, tasks)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to shut down cleanly.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this cache backend
    ///
    /// Used for logging and error attribution.
    fn name(&self) -> &'static str {
        "unknown"
    }
}
