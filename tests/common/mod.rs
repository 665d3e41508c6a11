//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - Redis connection settings
//! - Unique test keys
//! - Scripted mock tiers

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tiered_cache::backends::MockCache;
use tiered_cache::{CacheError, Expiry, Ttl};

/// Get Redis address from environment or use default
pub fn redis_addr() -> String {
    std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string())
}

/// Comma separated `host:port` list from `var`, if set
pub fn env_addrs(var: &str) -> Option<Vec<String>> {
    let addrs: Vec<String> = std::env::var(var)
        .ok()?
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(String::from)
        .collect();
    (!addrs.is_empty()).then_some(addrs)
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// A backend failure attributed to the mock
pub fn failure(message: &'static str) -> CacheError {
    CacheError::backend("Mock", anyhow::anyhow!(message))
}

/// Saves observed by a [`recording_mock`]
pub type SaveLog = Arc<Mutex<Vec<(String, Bytes, Expiry)>>>;

/// Mock tier that records every save
pub fn recording_mock() -> (Arc<MockCache>, SaveLog) {
    let mock = Arc::new(MockCache::new());
    let log: SaveLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    mock.set_save_callback(move |key, value, expiry| {
        sink.lock().push((key.to_string(), value.clone(), expiry));
        Ok(())
    });
    (mock, log)
}

/// Mock tier holding `value` for every key, with the given TTL
pub fn hit_mock(value: &'static [u8], ttl: Ttl) -> Arc<MockCache> {
    let mock = Arc::new(MockCache::new());
    mock.set_load_callback(move |_| Ok(Bytes::from_static(value)));
    mock.set_ttl_callback(move |_| Ok(ttl));
    mock
}

/// Mock tier failing every operation
pub fn failing_mock(message: &'static str) -> Arc<MockCache> {
    let mock = Arc::new(MockCache::new());
    mock.set_save_callback(move |_, _, _| Err(failure(message)));
    mock.set_load_callback(move |_| Err(failure(message)));
    mock.set_ttl_callback(move |_| Err(failure(message)));
    mock.set_stats_callback(move || Err(failure(message)));
    mock
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{sleep, Duration};

    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}
