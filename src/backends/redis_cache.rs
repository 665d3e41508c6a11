//! Redis Cache - Distributed Cache Backend
//!
//! Redis-based distributed cache. One backend type covers the three server
//! topologies: a single node, a primary tracked through Sentinel, and a
//! Redis Cluster. The topology is chosen from the configuration:
//!
//! | `master_name` | `addrs`   | topology |
//! |---------------|-----------|----------|
//! | set           | sentinels | failover |
//! | unset         | 2 or more | cluster  |
//! | unset         | 1         | single   |

use crate::config::{ConfigSource, ConfigSourceExt};
use crate::error::{CacheError, Result};
use crate::stats::{aggregate_cluster_stats, parse_info, standalone_fields, ClusterNode, Stats};
use anyhow::{anyhow, Context};
use bytes::Bytes;
use parking_lot::RwLock;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::cluster_routing::{RoutingInfo, SingleNodeRoutingInfo};
use redis::sentinel::{SentinelClient, SentinelClientBuilder, SentinelServerType};
use redis::{Client, ConnectionAddr, ErrorKind, FromRedisValue, RedisError, ServerErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const REDIS_CFG_KEY_ADDRS: &str = "cache.redis.addrs";
pub const REDIS_CFG_KEY_DB: &str = "cache.redis.db";
pub const REDIS_CFG_KEY_USERNAME: &str = "cache.redis.auth.username";
pub const REDIS_CFG_KEY_PASSWORD: &str = "cache.redis.auth.password";
pub const REDIS_CFG_KEY_DIAL_TIMEOUT: &str = "cache.redis.timeout.dial_ms";
pub const REDIS_CFG_KEY_READ_TIMEOUT: &str = "cache.redis.timeout.read_ms";
pub const REDIS_CFG_KEY_WRITE_TIMEOUT: &str = "cache.redis.timeout.write_ms";
pub const REDIS_CFG_KEY_READ_ONLY: &str = "cache.redis.cluster.read_only";
pub const REDIS_CFG_KEY_MASTER_NAME: &str = "cache.redis.failover.master_name";
pub const REDIS_CFG_KEY_SENTINEL_USERNAME: &str = "cache.redis.failover.auth.username";
pub const REDIS_CFG_KEY_SENTINEL_PASSWORD: &str = "cache.redis.failover.auth.password";

const DEFAULT_ADDR: &str = "127.0.0.1:6379";
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const BACKEND: &str = "Redis";

/// Username/password pair
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RedisAuth {
    /// `user:pass@` prefix for connection URLs, empty without credentials
    // TODO: percent-encode credentials containing reserved URL characters
    fn url_userinfo(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}@"),
            (Some(user), None) => format!("{user}@"),
            (None, Some(pass)) => format!(":{pass}@"),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Debug for RedisAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server layout the backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One server
    Single,
    /// Primary tracked through Sentinel
    Failover,
    /// Redis Cluster
    Cluster,
}

/// Configuration for `RedisCache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// `host:port` of the server, the cluster seed nodes or the sentinels
    pub addrs: Vec<String>,
    /// Database index (single and failover only)
    pub db: u32,
    /// Server credentials
    pub auth: RedisAuth,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Route cluster reads to replicas as well
    pub read_only: bool,
    /// Sentinel master name, enables failover
    pub master_name: Option<String>,
    /// Sentinel credentials
    pub sentinel_auth: RedisAuth,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            addrs: vec![DEFAULT_ADDR.to_string()],
            db: 0,
            auth: RedisAuth::default(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_only: false,
            master_name: None,
            sentinel_auth: RedisAuth::default(),
        }
    }
}

impl RedisCacheConfig {
    /// Topology implied by this configuration
    #[must_use]
    pub fn topology(&self) -> Topology {
        if self.master_name.is_some() {
            Topology::Failover
        } else if self.addrs.len() >= 2 {
            Topology::Cluster
        } else {
            Topology::Single
        }
    }

    fn node_url(&self, addr: &str, db: Option<u32>) -> String {
        let userinfo = self.auth.url_userinfo();
        match db {
            Some(db) => format!("redis://{userinfo}{addr}/{db}"),
            None => format!("redis://{userinfo}{addr}"),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn read_auth(source: &dyn ConfigSource, username_key: &str, password_key: &str) -> RedisAuth {
    RedisAuth {
        username: non_empty(source.get_or(username_key, None)),
        password: non_empty(source.get_or(password_key, None)),
    }
}

fn millis(source: &dyn ConfigSource, key: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(source.get_or(key, default_ms))
}

/// Map the reply of `TTL` to a [`Ttl`]
///
/// `-2` (no such key) and `0` are missing, `-1` means no expiry.
fn ttl_from_reply(secs: i64) -> Ttl {
    match secs {
        -1 => Ttl::Persistent,
        s if s > 0 => Ttl::Remaining(Duration::from_secs(s.unsigned_abs())),
        _ => Ttl::Missing,
    }
}

/// Primary and replica addresses from a `CLUSTER NODES` reply
///
/// Nodes flagged `fail` or `noaddr` are skipped.
fn parse_cluster_nodes(reply: &str) -> (Vec<String>, Vec<String>) {
    let mut primaries = Vec::new();
    let mut replicas = Vec::new();

    for line in reply.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_id), Some(addr), Some(flags)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let flags: Vec<&str> = flags.split(',').collect();
        if flags.iter().any(|f| matches!(*f, "fail" | "noaddr")) {
            continue;
        }
        // ip:port@cport[,hostname]
        let addr = addr.split(['@', ',']).next().unwrap_or_default();
        if addr.is_empty() || addr.starts_with(':') {
            continue;
        }
        if flags.contains(&"master") {
            primaries.push(addr.to_string());
        } else if flags.contains(&"slave") {
            replicas.push(addr.to_string());
        }
    }
    (primaries, replicas)
}

async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result
            .with_context(|| format!("{what} failed"))
            .map_err(|e| CacheError::backend(BACKEND, e)),
        Err(_) => Err(CacheError::backend(
            BACKEND,
            anyhow!("{what} timed out after {limit:?}"),
        )),
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts
fn split_addr(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| CacheError::backend(BACKEND, anyhow!("invalid address {addr:?}, expected host:port")))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in address {addr:?}"))
        .map_err(|e| CacheError::backend(BACKEND, e))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

/// `true` if `err` suggests the primary moved or went away
///
/// Timeouts, I/O failures, errors that need a new connection and `READONLY`
/// replies (the old primary was demoted) all qualify.
fn primary_lost(err: &CacheError) -> bool {
    err.find_source::<RedisError>().is_none_or(|e| {
        e.is_io_error()
            || e.is_unrecoverable_error()
            || matches!(
                e.kind(),
                ErrorKind::Server(ServerErrorKind::ReadOnly | ServerErrorKind::MasterDown)
            )
    })
}

/// One cluster node, reached through the shared cluster connection
struct RoutedNode {
    addr: String,
    host: String,
    port: u16,
    conn: ClusterConnection,
    read_timeout: Duration,
}

#[async_trait]
impl ClusterNode for RoutedNode {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn info(&self, section: Option<&str>) -> Result<String> {
        let mut cmd = redis::cmd("INFO");
        if let Some(section) = section {
            cmd.arg(section);
        }
        let routing = RoutingInfo::SingleNode(SingleNodeRoutingInfo::ByAddress {
            host: self.host.clone(),
            port: self.port,
        });

        let mut conn = self.conn.clone();
        let reply = with_timeout(
            self.read_timeout,
            "cluster node INFO",
            conn.route_command(cmd, routing),
        )
        .await?;
        String::from_redis_value(reply)
            .with_context(|| format!("unexpected INFO reply from {}", self.addr))
            .map_err(|e| CacheError::backend(BACKEND, e))
    }
}

/// Primary of a Sentinel-monitored group
///
/// The primary is looked up through Sentinel on first use and again after any
/// failure that suggests it moved, so a failover is followed without a rebuild.
struct Failover {
    sentinel: Mutex<SentinelClient>,
    primary: RwLock<Option<MultiplexedConnection>>,
}

impl Failover {
    async fn primary(&self, dial_timeout: Duration) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.primary.read().clone() {
            return Ok(conn);
        }

        let mut sentinel = self.sentinel.lock().await;
        // Resolved by another caller while we waited
        if let Some(conn) = self.primary.read().clone() {
            return Ok(conn);
        }
        let conn = with_timeout(
            dial_timeout,
            "sentinel primary connect",
            sentinel.get_async_connection(),
        )
        .await?;
        info!("[Redis] Connected to primary resolved through Sentinel");
        *self.primary.write() = Some(conn.clone());
        Ok(conn)
    }

    fn forget_primary(&self) {
        if self.primary.write().take().is_some() {
            warn!("[Redis] Primary connection dropped, resolving through Sentinel on next command");
        }
    }
}

#[derive(Clone)]
enum Connection {
    Standalone(ConnectionManager),
    Failover(Arc<Failover>),
    Cluster(ClusterConnection),
}

/// Redis distributed cache
///
/// Single nodes use a `ConnectionManager`, which reconnects automatically.
/// Failover groups follow the primary reported by Sentinel. Clusters use the
/// async cluster connection. Every command is bounded by the configured read
/// or write timeout.
pub struct RedisCache {
    /// `None` once closed
    conn: RwLock<Option<Connection>>,
    config: RedisCacheConfig,
}

impl RedisCache {
    /// Connect using `config`
    ///
    /// # Errors
    ///
    /// Returns an error if no connection could be established within the dial
    /// timeout, or if Sentinel does not know the configured master.
    pub async fn connect(config: RedisCacheConfig) -> Result<Self> {
        let topology = config.topology();
        info!(addrs = ?config.addrs, ?topology, "[Redis] Connecting");

        let conn = match topology {
            Topology::Single => {
                let addr = config.addrs.first().map_or(DEFAULT_ADDR, String::as_str);
                Connection::Standalone(Self::manager(&config, addr).await?)
            }
            Topology::Failover => Connection::Failover(Arc::new(Self::failover(&config)?)),
            Topology::Cluster => Connection::Cluster(Self::cluster(&config).await?),
        };

        let cache = Self {
            conn: RwLock::new(Some(conn)),
            config,
        };

        let _: String = cache
            .query(&redis::cmd("PING"), cache.config.dial_timeout, "PING")
            .await?;
        info!(addrs = ?cache.config.addrs, ?topology, "[Redis] Connected");
        Ok(cache)
    }

    async fn manager(config: &RedisCacheConfig, addr: &str) -> Result<ConnectionManager> {
        let url = config.node_url(addr, Some(config.db));
        let client = Client::open(url.as_str())
            .with_context(|| format!("Invalid Redis address: {addr}"))
            .map_err(|e| CacheError::backend(BACKEND, e))?;
        with_timeout(config.dial_timeout, "connect", ConnectionManager::new(client)).await
    }

    /// Sentinel client for the configured master; connects lazily
    fn failover(config: &RedisCacheConfig) -> Result<Failover> {
        let master_name = config.master_name.as_deref().unwrap_or_default();
        let sentinels = config
            .addrs
            .iter()
            .map(|addr| split_addr(addr).map(|(host, port)| ConnectionAddr::Tcp(host, port)))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = SentinelClientBuilder::new(sentinels, master_name, SentinelServerType::Master)
            .map_err(|e| CacheError::backend(BACKEND, e))?
            .set_client_to_redis_db(i64::from(config.db));
        if let Some(username) = &config.auth.username {
            builder = builder.set_client_to_redis_username(username);
        }
        if let Some(password) = &config.auth.password {
            builder = builder.set_client_to_redis_password(password);
        }
        if let Some(username) = &config.sentinel_auth.username {
            builder = builder.set_client_to_sentinel_username(username);
        }
        if let Some(password) = &config.sentinel_auth.password {
            builder = builder.set_client_to_sentinel_password(password);
        }
        let sentinel = builder
            .build()
            .context("Invalid Redis Sentinel configuration")
            .map_err(|e| CacheError::backend(BACKEND, e))?;

        Ok(Failover {
            sentinel: Mutex::new(sentinel),
            primary: RwLock::new(None),
        })
    }

    async fn cluster(config: &RedisCacheConfig) -> Result<ClusterConnection> {
        let seeds: Vec<String> = config
            .addrs
            .iter()
            .map(|addr| format!("redis://{addr}"))
            .collect();
        let mut builder = ClusterClientBuilder::new(seeds)
            .connection_timeout(config.dial_timeout)
            .response_timeout(config.read_timeout.max(config.write_timeout));
        if let Some(username) = &config.auth.username {
            builder = builder.username(username.clone());
        }
        if let Some(password) = &config.auth.password {
            builder = builder.password(password.clone());
        }
        if config.read_only {
            builder = builder.read_from_replicas();
        }
        let client = builder
            .build()
            .context("Invalid Redis Cluster configuration")
            .map_err(|e| CacheError::backend(BACKEND, e))?;
        with_timeout(
            config.dial_timeout,
            "cluster connect",
            client.get_async_connection(),
        )
        .await
    }

    /// Topology in use
    #[must_use]
    pub fn topology(&self) -> Topology {
        self.config.topology()
    }

    /// Current connection, or an error once closed
    fn connection(&self) -> Result<Connection> {
        self.conn
            .read()
            .clone()
            .ok_or_else(|| CacheError::backend(BACKEND, anyhow!("connection closed")))
    }

    async fn query<T: FromRedisValue + Send>(
        &self,
        cmd: &redis::Cmd,
        limit: Duration,
        what: &str,
    ) -> Result<T> {
        match self.connection()? {
            Connection::Standalone(mut conn) => {
                with_timeout(limit, what, cmd.query_async(&mut conn)).await
            }
            Connection::Failover(failover) => {
                let mut conn = failover.primary(self.config.dial_timeout).await?;
                let result = with_timeout(limit, what, cmd.query_async(&mut conn)).await;
                if let Err(e) = &result {
                    if primary_lost(e) {
                        failover.forget_primary();
                    }
                }
                result
            }
            Connection::Cluster(mut conn) => {
                with_timeout(limit, what, cmd.query_async(&mut conn)).await
            }
        }
    }

    async fn cluster_stats(&self, conn: &ClusterConnection) -> Result<Stats> {
        let reply: String = self
            .query(
                redis::cmd("CLUSTER").arg("NODES"),
                self.config.read_timeout,
                "CLUSTER NODES",
            )
            .await?;
        let (primaries, replicas) = parse_cluster_nodes(&reply);

        let node = |addr: String| {
            split_addr(&addr).map(|(host, port)| RoutedNode {
                addr,
                host,
                port,
                conn: conn.clone(),
                read_timeout: self.config.read_timeout,
            })
        };
        let primaries = primaries.into_iter().map(node).collect::<Result<Vec<_>>>()?;
        let replicas = replicas.into_iter().map(node).collect::<Result<Vec<_>>>()?;

        aggregate_cluster_stats(&primaries, &replicas, self.config.read_only).await
    }
}

// ===== Trait Implementations =====

use crate::reload::Reloadable;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for RedisCache {
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
        let (mut cmd, what) = if expiry.is_delete() {
            (redis::cmd("DEL"), "DEL")
        } else {
            (redis::cmd("SET"), "SET")
        };
        cmd.arg(key);
        if !expiry.is_delete() {
            cmd.arg(value.as_ref());
        }
        if let Some(secs) = expiry.whole_secs() {
            cmd.arg("EX").arg(secs);
        }

        let () = self.query(&cmd, self.config.write_timeout, what).await?;
        debug!(key = %key, ttl_secs = ?expiry.whole_secs(), delete = expiry.is_delete(), "[Redis] Saved key");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Bytes> {
        let value: Option<Vec<u8>> = self
            .query(redis::cmd("GET").arg(key), self.config.read_timeout, "GET")
            .await?;
        value.map(Bytes::from).ok_or(CacheError::NotFound)
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let secs: i64 = self
            .query(redis::cmd("TTL").arg(key), self.config.read_timeout, "TTL")
            .await?;
        Ok(ttl_from_reply(secs))
    }

    async fn stats(&self) -> Result<Stats> {
        if let Connection::Cluster(conn) = self.connection()? {
            return self.cluster_stats(&conn).await;
        }
        let report: String = self
            .query(&redis::cmd("INFO"), self.config.read_timeout, "INFO")
            .await?;
        Ok(parse_info(&report, &standalone_fields(self.config.db)))
    }

    async fn close(&self) -> Result<()> {
        let released = self.conn.write().take();
        if released.is_some() {
            info!(addrs = ?self.config.addrs, "[Redis] Connection closed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[async_trait]
impl Reloadable for RedisCache {
    type Config = RedisCacheConfig;

    fn config_keys() -> &'static [&'static str] {
        &[
            REDIS_CFG_KEY_ADDRS,
            REDIS_CFG_KEY_DB,
            REDIS_CFG_KEY_USERNAME,
            REDIS_CFG_KEY_PASSWORD,
            REDIS_CFG_KEY_DIAL_TIMEOUT,
            REDIS_CFG_KEY_READ_TIMEOUT,
            REDIS_CFG_KEY_WRITE_TIMEOUT,
            REDIS_CFG_KEY_READ_ONLY,
            REDIS_CFG_KEY_MASTER_NAME,
            REDIS_CFG_KEY_SENTINEL_USERNAME,
            REDIS_CFG_KEY_SENTINEL_PASSWORD,
        ]
    }

    fn read_config(source: &dyn ConfigSource) -> RedisCacheConfig {
        let mut addrs: Vec<String> = source.get_or(REDIS_CFG_KEY_ADDRS, Vec::new());
        addrs.retain(|addr| !addr.is_empty());
        if addrs.is_empty() {
            addrs.push(DEFAULT_ADDR.to_string());
        }

        RedisCacheConfig {
            addrs,
            db: source.get_or(REDIS_CFG_KEY_DB, 0),
            auth: read_auth(source, REDIS_CFG_KEY_USERNAME, REDIS_CFG_KEY_PASSWORD),
            dial_timeout: millis(source, REDIS_CFG_KEY_DIAL_TIMEOUT, DEFAULT_DIAL_TIMEOUT),
            read_timeout: millis(source, REDIS_CFG_KEY_READ_TIMEOUT, DEFAULT_READ_TIMEOUT),
            write_timeout: millis(source, REDIS_CFG_KEY_WRITE_TIMEOUT, DEFAULT_WRITE_TIMEOUT),
            read_only: source.get_or(REDIS_CFG_KEY_READ_ONLY, false),
            master_name: non_empty(source.get_or(REDIS_CFG_KEY_MASTER_NAME, None)),
            sentinel_auth: read_auth(
                source,
                REDIS_CFG_KEY_SENTINEL_USERNAME,
                REDIS_CFG_KEY_SENTINEL_PASSWORD,
            ),
        }
    }

    async fn build(config: &RedisCacheConfig) -> Result<Self> {
        Self::connect(config.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use serde_json::json;

    #[test]
    fn test_topology_selection() {
        let mut config = RedisCacheConfig::default();
        assert_eq!(config.topology(), Topology::Single);

        config.addrs = vec!["10.0.0.1:7000".into(), "10.0.0.2:7000".into()];
        assert_eq!(config.topology(), Topology::Cluster);

        config.master_name = Some("mymaster".into());
        assert_eq!(config.topology(), Topology::Failover);
    }

    #[test]
    fn test_ttl_reply_mapping() {
        assert_eq!(ttl_from_reply(-2), Ttl::Missing);
        assert_eq!(ttl_from_reply(0), Ttl::Missing);
        assert_eq!(ttl_from_reply(-1), Ttl::Persistent);
        assert_eq!(
            ttl_from_reply(42),
            Ttl::Remaining(Duration::from_secs(42))
        );
    }

    #[test]
    fn test_read_config_defaults_and_overrides() {
        let empty = MapConfig::new();
        assert_eq!(RedisCache::read_config(&empty), RedisCacheConfig::default());

        let config = MapConfig::with_values([
            (REDIS_CFG_KEY_ADDRS, json!(["a:1", "b:2", ""])),
            (REDIS_CFG_KEY_DB, json!(3)),
            (REDIS_CFG_KEY_PASSWORD, json!("secret")),
            (REDIS_CFG_KEY_READ_TIMEOUT, json!(250)),
            (REDIS_CFG_KEY_MASTER_NAME, json!("")),
        ]);
        let parsed = RedisCache::read_config(&config);
        assert_eq!(parsed.addrs, vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(parsed.db, 3);
        assert_eq!(parsed.auth.password.as_deref(), Some("secret"));
        assert_eq!(parsed.read_timeout, Duration::from_millis(250));
        assert_eq!(parsed.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        assert_eq!(parsed.master_name, None);
        assert_eq!(parsed.topology(), Topology::Cluster);
    }

    #[test]
    fn test_node_url_and_redacted_debug() {
        let config = RedisCacheConfig {
            auth: RedisAuth {
                username: Some("app".into()),
                password: Some("hunter2".into()),
            },
            ..RedisCacheConfig::default()
        };
        assert_eq!(
            config.node_url("h:6379", Some(2)),
            "redis://app:hunter2@h:6379/2"
        );
        assert_eq!(
            RedisCacheConfig::default().node_url("h:6379", None),
            "redis://h:6379"
        );
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_split_addr() {
        assert_eq!(split_addr("127.0.0.1:30002").unwrap(), ("127.0.0.1".to_string(), 30002));
        assert_eq!(split_addr("[::1]:7000").unwrap(), ("::1".to_string(), 7000));
        assert!(split_addr("localhost").is_err());
        assert!(split_addr("localhost:port").is_err());
    }

    #[test]
    fn test_primary_lost_classification() {
        let from_redis = |err: RedisError| {
            CacheError::backend(BACKEND, anyhow::Error::new(err).context("SET failed"))
        };

        assert!(primary_lost(&CacheError::backend(BACKEND, anyhow!("SET timed out after 5s"))));
        assert!(primary_lost(&from_redis(RedisError::from((
            ErrorKind::Server(ServerErrorKind::ReadOnly),
            "You can't write against a read only replica.",
        )))));
        assert!(primary_lost(&from_redis(RedisError::from((ErrorKind::Io, "broken pipe")))));
        assert!(!primary_lost(&from_redis(RedisError::from((
            ErrorKind::UnexpectedReturnType,
            "WRONGTYPE",
        )))));
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let config = RedisCacheConfig {
            addrs: vec!["127.0.0.1:26379".into()],
            master_name: Some("mymaster".into()),
            ..RedisCacheConfig::default()
        };
        // Building the Sentinel client does not connect
        let failover = Arc::new(RedisCache::failover(&config).unwrap());
        let cache = RedisCache {
            conn: RwLock::new(Some(Connection::Failover(Arc::clone(&failover)))),
            config,
        };
        assert_eq!(Arc::strong_count(&failover), 2);

        cache.close().await.unwrap();
        assert_eq!(Arc::strong_count(&failover), 1);
        cache.close().await.unwrap();

        let err = cache.load("k").await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(err.backend_name(), Some(BACKEND));
        assert!(cache.stats().await.is_err());
    }

    #[test]
    fn test_parse_cluster_nodes() {
        let reply = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004,host4 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005 slave,fail 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 :0@0 master,noaddr - 1426238316232 1426238316232 6 disconnected
";
        let (primaries, replicas) = parse_cluster_nodes(reply);
        assert_eq!(
            primaries,
            vec!["127.0.0.1:30002", "127.0.0.1:30003", "127.0.0.1:30001"]
        );
        assert_eq!(replicas, vec!["127.0.0.1:30004"]);
    }
}
