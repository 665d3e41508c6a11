//! Nop Cache - No-Operation Backend
//!
//! Useful to disable caching without changing call sites.

use crate::error::{CacheError, Result};
use crate::stats::Stats;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;
use bytes::Bytes;

/// Backend that stores nothing
///
/// Saves are ignored, loads always miss and stats are always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCache;

#[async_trait]
impl CacheBackend for NopCache {
    async fn save(&self, _key: &str, _value: Bytes, _expiry: Expiry) -> Result<()> {
        Ok(())
    }

    async fn load(&self, _key: &str) -> Result<Bytes> {
        Err(CacheError::NotFound)
    }

    async fn ttl(&self, _key: &str) -> Result<Ttl> {
        Ok(Ttl::Missing)
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(Stats::default())
    }

    fn name(&self) -> &'static str {
        "Nop"
    }
}
