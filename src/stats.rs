//! Cache Statistics
//!
//! The common [`Stats`] shape reported by every backend, plus the aggregation
//! helpers used by remote backends:
//!
//! - [`parse_info`] turns a raw `INFO` style report into [`Stats`]
//! - [`aggregate_cluster_stats`] fans out to every node of a cluster
//!   concurrently and sums the per-node reports

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use tracing::debug;

/// Memory and keys statistics
///
/// Useful to feed a metrics system or simply for debugging. For distributed
/// backends the numbers are shared with (and affected by) every other client of
/// the same server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Memory in use, in bytes
    pub memory_used: u64,
    /// Maximum memory, in bytes. For a Redis server without `maxmemory` this is
    /// the total system memory.
    pub memory_max: u64,
    /// Successful key lookups
    pub hits: u64,
    /// Lookups of missing keys
    pub misses: u64,
    /// Current number of keys. Always 0 for a Redis cluster.
    pub key_count: u64,
    /// Keys removed because they expired
    pub expired_count: u64,
    /// Keys removed to make room for new ones
    pub evicted_count: u64,
}

impl Stats {
    /// Percentage of lookups that were hits (100 when there were no lookups)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits.saturating_add(self.misses);
        if lookups == 0 {
            100.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }

    /// Percentage of maximum memory in use (100 when the maximum is unknown)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_usage(&self) -> f64 {
        if self.memory_max == 0 {
            100.0
        } else {
            self.memory_used as f64 / self.memory_max as f64 * 100.0
        }
    }
}

impl Add for Stats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            memory_used: self.memory_used.saturating_add(rhs.memory_used),
            memory_max: self.memory_max.saturating_add(rhs.memory_max),
            hits: self.hits.saturating_add(rhs.hits),
            misses: self.misses.saturating_add(rhs.misses),
            key_count: self.key_count.saturating_add(rhs.key_count),
            expired_count: self.expired_count.saturating_add(rhs.expired_count),
            evicted_count: self.evicted_count.saturating_add(rhs.evicted_count),
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Stats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl fmt::Display for Stats {
    /// Human friendly representation, e.g.
    /// `mem=1.25M maxMem=7.77G memUsage=0.02% hits=101701 misses=0 hitRate=100.00% keys=1 expired=14473 evicted=0`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mem={} maxMem={} memUsage={:.2}% hits={} misses={} hitRate={:.2}% keys={} expired={} evicted={}",
            bytes_human_friendly(self.memory_used),
            bytes_human_friendly(self.memory_max),
            self.memory_usage(),
            self.hits,
            self.misses,
            self.hit_rate(),
            self.key_count,
            self.expired_count,
            self.evicted_count,
        )
    }
}

/// Format a byte count with a binary unit suffix, e.g. `2097152` -> `"2M"`
#[allow(clippy::cast_precision_loss)]
fn bytes_human_friendly(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const MEASURE: [char; 7] = ['B', 'K', 'M', 'G', 'T', 'P', 'E'];

    let mut div = 1_u64;
    let mut exp = 0_usize;
    let mut n = bytes;
    while n >= UNIT {
        n /= UNIT;
        div *= UNIT;
        exp += 1;
    }

    let result = bytes as f64 / div as f64;
    let unit = MEASURE.get(exp).copied().unwrap_or('E');
    if result.fract() < 0.001 {
        format!("{result:.0}{unit}")
    } else {
        format!("{result:.2}{unit}")
    }
}

/// Maximum number of digits read after a report marker
const MAX_DIGITS: usize = 20;

/// A statistic extracted from a Redis `INFO` report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoField {
    /// `used_memory:`
    UsedMemory,
    /// `maxmemory:`
    MaxMemory,
    /// `total_system_memory:`, the fallback for an unset `maxmemory`
    TotalSystemMemory,
    /// `keyspace_hits:`
    Hits,
    /// `keyspace_misses:`
    Misses,
    /// `expired_keys:`
    ExpiredKeys,
    /// `evicted_keys:`
    EvictedKeys,
    /// `db<N>:keys=` from the keyspace section
    DbKeys(u32),
}

impl InfoField {
    /// Text preceding the value in the report
    #[must_use]
    pub fn marker(&self) -> Cow<'static, str> {
        match self {
            Self::UsedMemory => Cow::Borrowed("used_memory:"),
            Self::MaxMemory => Cow::Borrowed("maxmemory:"),
            Self::TotalSystemMemory => Cow::Borrowed("total_system_memory:"),
            Self::Hits => Cow::Borrowed("keyspace_hits:"),
            Self::Misses => Cow::Borrowed("keyspace_misses:"),
            Self::ExpiredKeys => Cow::Borrowed("expired_keys:"),
            Self::EvictedKeys => Cow::Borrowed("evicted_keys:"),
            Self::DbKeys(db) => Cow::Owned(format!("db{db}:keys=")),
        }
    }
}

/// Fields read from a primary node. The key count is not part of it: `INFO
/// keyspace` is meaningless on a cluster and counting every slot is too costly.
pub const PRIMARY_FIELDS: &[InfoField] = &[
    InfoField::UsedMemory,
    InfoField::MaxMemory,
    InfoField::TotalSystemMemory,
    InfoField::EvictedKeys,
    InfoField::ExpiredKeys,
    InfoField::Hits,
    InfoField::Misses,
];

/// Fields read from a replica node
pub const REPLICA_FIELDS: &[InfoField] = &[InfoField::Hits, InfoField::Misses];

/// Fields read from a standalone (single node or sentinel-managed) server
#[must_use]
pub fn standalone_fields(db: u32) -> Vec<InfoField> {
    let mut fields = PRIMARY_FIELDS.to_vec();
    fields.push(InfoField::DbKeys(db));
    fields
}

/// Parse a raw statistics report into [`Stats`]
///
/// The report is scanned once per field marker; the run of decimal digits
/// right after a marker is the value. Missing markers leave the field at zero,
/// anything else in the report is ignored.
#[must_use]
pub fn parse_info(report: &str, fields: &[InfoField]) -> Stats {
    let mut stats = Stats::default();
    let mut max_memory = 0;
    let mut total_system_memory = 0;

    for field in fields {
        let Some(value) = read_marker(report, &field.marker()) else {
            continue;
        };
        match field {
            InfoField::UsedMemory => stats.memory_used = value,
            InfoField::MaxMemory => max_memory = value,
            InfoField::TotalSystemMemory => total_system_memory = value,
            InfoField::Hits => stats.hits = value,
            InfoField::Misses => stats.misses = value,
            InfoField::ExpiredKeys => stats.expired_count = value,
            InfoField::EvictedKeys => stats.evicted_count = value,
            InfoField::DbKeys(_) => stats.key_count = value,
        }
    }

    stats.memory_max = if max_memory > 0 {
        max_memory
    } else {
        total_system_memory
    };
    stats
}

fn read_marker(report: &str, marker: &str) -> Option<u64> {
    let start = report.find(marker)? + marker.len();
    let rest = report.get(start..)?;
    let len = rest
        .bytes()
        .take(MAX_DIGITS)
        .take_while(u8::is_ascii_digit)
        .count();
    match rest.get(..len) {
        Some("") | None => Some(0),
        Some(digits) => Some(digits.parse().unwrap_or(u64::MAX)),
    }
}

/// One node of a multi-node topology that can produce a statistics report
#[async_trait]
pub trait ClusterNode: Send + Sync {
    /// Address used for logging
    fn addr(&self) -> &str;

    /// Raw `INFO` report, optionally restricted to one section
    ///
    /// # Errors
    ///
    /// Returns an error if the node could not be queried.
    async fn info(&self, section: Option<&str>) -> Result<String>;
}

/// Sum statistics across every node of a cluster
///
/// All primaries are queried concurrently for memory, hit/miss and
/// expired/evicted counters. With `read_from_replicas`, reads also land on
/// replicas, so their hit/miss counters are added too. The key count stays 0.
///
/// # Errors
///
/// The first node failure aborts the whole call; there is no partial result.
pub async fn aggregate_cluster_stats<N: ClusterNode>(
    primaries: &[N],
    replicas: &[N],
    read_from_replicas: bool,
) -> Result<Stats> {
    let per_primary = try_join_all(primaries.iter().map(|node| async move {
        let report = node.info(None).await?;
        Ok::<_, CacheError>(parse_info(&report, PRIMARY_FIELDS))
    }))
    .await?;

    let mut total: Stats = per_primary.into_iter().sum();
    total.key_count = 0;

    if read_from_replicas {
        let per_replica = try_join_all(replicas.iter().map(|node| async move {
            let report = node.info(Some("stats")).await?;
            Ok::<_, CacheError>(parse_info(&report, REPLICA_FIELDS))
        }))
        .await?;

        for replica in per_replica {
            total.hits = total.hits.saturating_add(replica.hits);
            total.misses = total.misses.saturating_add(replica.misses);
        }
    }

    debug!(
        primaries = primaries.len(),
        replicas = if read_from_replicas { replicas.len() } else { 0 },
        "[Stats] Aggregated cluster statistics"
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const REPORT: &str = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n\
        maxmemory:0\r\ntotal_system_memory:8342106112\r\n# Stats\r\nexpired_keys:14473\r\n\
        evicted_keys:3\r\nkeyspace_hits:101701\r\nkeyspace_misses:12\r\n\
        # Keyspace\r\ndb0:keys=59,expires=1,avg_ttl=98929\r\n";

    #[test]
    fn test_parse_standalone_report() {
        let stats = parse_info(REPORT, &standalone_fields(0));
        assert_eq!(
            stats,
            Stats {
                memory_used: 1_048_576,
                memory_max: 8_342_106_112,
                hits: 101_701,
                misses: 12,
                key_count: 59,
                expired_count: 14_473,
                evicted_count: 3,
            }
        );
    }

    #[test]
    fn test_parse_prefers_configured_max_memory() {
        let report = "maxmemory:1073741824\r\ntotal_system_memory:8342106112\r\n";
        let stats = parse_info(report, PRIMARY_FIELDS);
        assert_eq!(stats.memory_max, 1_073_741_824);
    }

    #[test]
    fn test_parse_missing_markers_and_other_db() {
        let stats = parse_info("garbage\r\nkeyspace_hits:\r\n", &standalone_fields(3));
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_parse_bounds_digit_run() {
        let report = "keyspace_hits:1234567890123456789012\r\nkeyspace_misses:99999999999999999999\r\n";
        let stats = parse_info(report, REPLICA_FIELDS);
        assert_eq!(stats.hits, 12_345_678_901_234_567_890);
        // 20 nines overflow u64 and saturate
        assert_eq!(stats.misses, u64::MAX);
    }

    #[test]
    fn test_display_human_friendly() {
        let stats = Stats {
            memory_used: 2 * 1024 * 1024,
            memory_max: 8 * 1024 * 1024 * 1024,
            hits: 3,
            misses: 1,
            key_count: 1,
            expired_count: 0,
            evicted_count: 0,
        };
        assert_eq!(
            stats.to_string(),
            "mem=2M maxMem=8G memUsage=0.02% hits=3 misses=1 hitRate=75.00% keys=1 expired=0 evicted=0"
        );
        assert_eq!(bytes_human_friendly(1280), "1.25K");
        assert_eq!(bytes_human_friendly(1023), "1023B");
    }

    #[test]
    fn test_empty_stats_rates_default_to_full() {
        let stats = Stats::default();
        assert!((stats.hit_rate() - 100.0).abs() < f64::EPSILON);
        assert!((stats.memory_usage() - 100.0).abs() < f64::EPSILON);
    }

    struct FakeNode {
        addr: String,
        report: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeNode {
        fn new(addr: &str, report: Option<&str>) -> Self {
            Self {
                addr: addr.to_string(),
                report: report.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClusterNode for FakeNode {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn info(&self, _section: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.report
                .clone()
                .ok_or_else(|| CacheError::backend("Redis", anyhow::anyhow!("{} is down", self.addr)))
        }
    }

    #[tokio::test]
    async fn test_cluster_sums_primaries_and_replicas() {
        let primaries = vec![
            FakeNode::new("n1:7000", Some(REPORT)),
            FakeNode::new("n2:7001", Some(REPORT)),
        ];
        let replicas = vec![FakeNode::new("n3:7002", Some("keyspace_hits:10\r\nkeyspace_misses:2\r\nused_memory:999\r\n"))];

        let stats = aggregate_cluster_stats(&primaries, &replicas, true).await.unwrap();
        assert_eq!(stats.memory_used, 2 * 1_048_576);
        assert_eq!(stats.memory_max, 2 * 8_342_106_112);
        assert_eq!(stats.hits, 2 * 101_701 + 10);
        assert_eq!(stats.misses, 2 * 12 + 2);
        assert_eq!(stats.expired_count, 2 * 14_473);
        assert_eq!(stats.evicted_count, 6);
        assert_eq!(stats.key_count, 0);

        let without_replicas = aggregate_cluster_stats(&primaries, &replicas, false).await.unwrap();
        assert_eq!(without_replicas.hits, 2 * 101_701);
        assert_eq!(replicas[0].calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cluster_fails_fast_on_node_error() {
        let primaries = vec![
            FakeNode::new("n1:7000", Some(REPORT)),
            FakeNode::new("n2:7001", None),
        ];
        let err = aggregate_cluster_stats(&primaries, &[], true).await.unwrap_err();
        assert!(err.to_string().contains("n2:7001 is down"));
    }
}
