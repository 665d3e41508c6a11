//! Hot Backend Reconfiguration
//!
//! [`ReloadableBackendHandle`] owns exactly one live backend instance together
//! with the configuration it was built from. Cache operations borrow the live
//! instance with shared access for the duration of a single call; a relevant
//! configuration change builds a new instance *outside* any lock, then takes
//! exclusive access only to publish it. The displaced instance is closed after
//! the swap, so there is never a moment without a live backend and no caller
//! ever sees an instance half-replaced. Reconfigurations themselves run one at
//! a time, so the last configuration read is always the one left live.
//!
//! ```text
//! Live(instance, config) --relevant change--> build(config') --swap--> Live(instance', config')
//!                                                                 \--> close(instance)
//! ```

use crate::config::{ChangedKeys, ConfigSource};
use crate::error::Result;
use crate::stats::Stats;
use crate::traits::{CacheBackend, Expiry, Ttl};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A backend that can be rebuilt from configuration
///
/// Remote backends only need to rebuild their connection. Local stores that
/// hold the data themselves override [`Reloadable::migrate_from`] to carry
/// existing entries over to the new instance.
#[async_trait]
pub trait Reloadable: CacheBackend + Sized + 'static {
    /// Configuration snapshot the instance is built from
    type Config: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Configuration keys this backend depends on
    fn config_keys() -> &'static [&'static str];

    /// Read the backend configuration from `source`
    fn read_config(source: &dyn ConfigSource) -> Self::Config;

    /// Build a new instance from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the instance could not be created (e.g. the server
    /// is unreachable).
    async fn build(config: &Self::Config) -> Result<Self>;

    /// Copy state from the outgoing instance. Runs while exclusive access is
    /// held, right before the new instance is published.
    async fn migrate_from(&self, _old: &Self) {}
}

struct Live<B: Reloadable> {
    instance: B,
    config: B::Config,
}

enum Slot<B: Reloadable> {
    /// Built directly, never replaced
    Fixed(Live<B>),
    /// Replaceable under read/write exclusion
    Shared(RwLock<Live<B>>),
}

enum LiveGuard<'a, B: Reloadable> {
    Fixed(&'a Live<B>),
    Shared(RwLockReadGuard<'a, Live<B>>),
}

impl<B: Reloadable> Deref for LiveGuard<'_, B> {
    type Target = Live<B>;

    fn deref(&self) -> &Live<B> {
        match self {
            Self::Fixed(live) => live,
            Self::Shared(guard) => guard,
        }
    }
}

/// Handle around a live, replaceable backend
///
/// The handle itself implements [`CacheBackend`], so it can be used anywhere a
/// backend is expected, including as a tier of a [`TieredCache`](crate::TieredCache).
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tiered_cache::backends::MokaCache;
/// use tiered_cache::config::MapConfig;
/// use tiered_cache::ReloadableBackendHandle;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> tiered_cache::Result<()> {
/// let config = Arc::new(MapConfig::new());
/// let memory = Arc::new(ReloadableBackendHandle::<MokaCache>::from_source(config.as_ref()).await?);
///
/// // Apply every configuration change published by `config`
/// let _listener = Arc::clone(&memory).spawn_change_listener(
///     config.clone(),
///     config.subscribe(),
///     CancellationToken::new(),
/// );
/// # Ok(())
/// # }
/// ```
pub struct ReloadableBackendHandle<B: Reloadable> {
    slot: Slot<B>,
    name: &'static str,
    /// Held from reading the config until the swap; never blocks cache calls
    reconfigure: Mutex<()>,
}

impl<B: Reloadable> ReloadableBackendHandle<B> {
    /// Wrap an instance that can later be replaced
    pub fn new(instance: B, config: B::Config) -> Self {
        let name = instance.name();
        Self {
            slot: Slot::Shared(RwLock::new(Live { instance, config })),
            name,
            reconfigure: Mutex::new(()),
        }
    }

    /// Wrap an instance that is never replaced
    ///
    /// Accesses skip locking entirely and configuration changes are ignored.
    pub fn fixed(instance: B, config: B::Config) -> Self {
        let name = instance.name();
        Self {
            slot: Slot::Fixed(Live { instance, config }),
            name,
            reconfigure: Mutex::new(()),
        }
    }

    /// Read the configuration from `source` and build a replaceable instance
    ///
    /// # Errors
    ///
    /// Returns an error if the initial instance could not be built.
    pub async fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let config = B::read_config(source);
        let instance = B::build(&config).await?;
        Ok(Self::new(instance, config))
    }

    /// `true` unless the handle was built with [`ReloadableBackendHandle::fixed`]
    pub fn is_reloadable(&self) -> bool {
        matches!(self.slot, Slot::Shared(_))
    }

    /// Snapshot of the configuration the live instance was built from
    pub async fn config(&self) -> B::Config {
        self.live().await.config.clone()
    }

    async fn live(&self) -> LiveGuard<'_, B> {
        match &self.slot {
            Slot::Fixed(live) => LiveGuard::Fixed(live),
            Slot::Shared(lock) => LiveGuard::Shared(lock.read().await),
        }
    }

    /// Apply a configuration change
    ///
    /// Changes that touch none of [`Reloadable::config_keys`], or that leave
    /// the effective configuration as it is, are no-ops. Otherwise a new
    /// instance is built without holding any lock, then swapped in under
    /// exclusive access, and the old instance is closed afterwards. Close
    /// failures are logged, never returned.
    ///
    /// Returns `Ok(true)` if the backend was replaced.
    ///
    /// # Errors
    ///
    /// Returns the build error if the new instance could not be created; the
    /// current instance then stays live.
    pub async fn on_config_change(
        &self,
        source: &dyn ConfigSource,
        changed_keys: &ChangedKeys,
    ) -> Result<bool> {
        let Slot::Shared(lock) = &self.slot else {
            return Ok(false);
        };
        if !changed_keys
            .iter()
            .any(|key| B::config_keys().contains(&key.as_str()))
        {
            return Ok(false);
        }

        let _serial = self.reconfigure.lock().await;
        let config = B::read_config(source);
        if lock.read().await.config == config {
            debug!(backend = %self.name, "Relevant keys changed but effective config is the same");
            return Ok(false);
        }

        let fresh = B::build(&config).await.inspect_err(|e| {
            error!(backend = %self.name, error = %e, "Failed to build reconfigured backend, keeping current one");
        })?;

        let old = {
            let mut live = lock.write().await;
            fresh.migrate_from(&live.instance).await;
            std::mem::replace(
                &mut *live,
                Live {
                    instance: fresh,
                    config,
                },
            )
        };
        info!(backend = %self.name, config = ?old.config, "Backend reconfigured, closing previous instance");

        if let Err(e) = old.instance.close().await {
            warn!(backend = %self.name, error = %e, "Failed to close previous backend instance");
        }
        Ok(true)
    }

    /// Spawn a task applying every change published on `changes`
    ///
    /// The task stops when `cancel` fires or the channel closes. If the task
    /// falls behind and misses notifications, the configuration is re-read as
    /// if every relevant key had changed.
    pub fn spawn_change_listener(
        self: Arc<Self>,
        source: Arc<dyn ConfigSource>,
        mut changes: broadcast::Receiver<ChangedKeys>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let changed_keys = tokio::select! {
                    () = cancel.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(keys) => keys,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(backend = %self.name, missed, "Missed configuration changes, re-reading config");
                            B::config_keys().iter().map(ToString::to_string).collect()
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                // Failures are logged by on_config_change, the old instance stays live
                let _ = self.on_config_change(source.as_ref(), &changed_keys).await;
            }
            debug!(backend = %self.name, "Configuration listener stopped");
        })
    }
}

#[async_trait]
impl<B: Reloadable> CacheBackend for ReloadableBackendHandle<B> {
    async fn save(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<()> {
        let live = self.live().await;
        live.instance.save(key, value, expiry).await
    }

    async fn load(&self, key: &str) -> Result<Bytes> {
        let live = self.live().await;
        live.instance.load(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let live = self.live().await;
        live.instance.ttl(key).await
    }

    async fn stats(&self) -> Result<Stats> {
        let live = self.live().await;
        live.instance.stats().await
    }

    async fn close(&self) -> Result<()> {
        let live = self.live().await;
        live.instance.close().await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::error::CacheError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CLOSED: AtomicUsize = AtomicUsize::new(0);

    /// Generation whose build takes noticeably longer than the others
    const SLOW_GENERATION: u64 = 10;

    /// Backend whose only state is the generation it was built for
    struct Versioned {
        generation: u64,
    }

    #[async_trait]
    impl CacheBackend for Versioned {
        async fn save(&self, _key: &str, _value: Bytes, _expiry: Expiry) -> Result<()> {
            Ok(())
        }

        async fn load(&self, _key: &str) -> Result<Bytes> {
            Ok(Bytes::from(self.generation.to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<Ttl> {
            Ok(Ttl::Persistent)
        }

        async fn stats(&self) -> Result<Stats> {
            Ok(Stats::default())
        }

        async fn close(&self) -> Result<()> {
            CLOSED.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::backend("Versioned", anyhow::anyhow!("close always fails")))
        }

        fn name(&self) -> &'static str {
            "Versioned"
        }
    }

    #[async_trait]
    impl Reloadable for Versioned {
        type Config = u64;

        fn config_keys() -> &'static [&'static str] {
            &["test.generation"]
        }

        fn read_config(source: &dyn ConfigSource) -> u64 {
            use crate::config::ConfigSourceExt;
            source.get_or("test.generation", 0)
        }

        async fn build(config: &u64) -> Result<Self> {
            if *config == u64::MAX {
                return Err(CacheError::backend("Versioned", anyhow::anyhow!("cannot build")));
            }
            if *config == SLOW_GENERATION {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Ok(Self { generation: *config })
        }
    }

    #[tokio::test]
    async fn test_reconfiguration_swaps_and_ignores_close_error() {
        let config = MapConfig::with_values([("test.generation", json!(1))]);
        let handle = ReloadableBackendHandle::<Versioned>::from_source(&config).await.unwrap();
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("1"));

        let before = CLOSED.load(Ordering::SeqCst);
        let changed = config.update([("test.generation", json!(2))]);
        assert!(handle.on_config_change(&config, &changed).await.unwrap());
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("2"));
        assert_eq!(handle.config().await, 2);
        assert!(CLOSED.load(Ordering::SeqCst) > before);
    }

    #[tokio::test]
    async fn test_irrelevant_or_same_config_is_noop() {
        let config = MapConfig::with_values([("test.generation", json!(1))]);
        let handle = ReloadableBackendHandle::<Versioned>::from_source(&config).await.unwrap();

        let changed = config.update([("other.key", json!(true))]);
        assert!(!handle.on_config_change(&config, &changed).await.unwrap());

        let same = ChangedKeys::from(["test.generation".to_string()]);
        assert!(!handle.on_config_change(&config, &same).await.unwrap());
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("1"));
    }

    #[tokio::test]
    async fn test_failed_build_keeps_current_instance() {
        let config = MapConfig::with_values([("test.generation", json!(1))]);
        let handle = ReloadableBackendHandle::<Versioned>::from_source(&config).await.unwrap();

        let changed = config.update([("test.generation", json!(u64::MAX))]);
        assert!(handle.on_config_change(&config, &changed).await.is_err());
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_changes_leave_latest_config_live() {
        let config = MapConfig::with_values([("test.generation", json!(1))]);
        let handle = ReloadableBackendHandle::<Versioned>::from_source(&config).await.unwrap();

        // The slow build starts first, the fast one is requested while it runs
        let changed = config.update([("test.generation", json!(SLOW_GENERATION))]);
        let slow = handle.on_config_change(&config, &changed);
        let fast = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let changed = config.update([("test.generation", json!(11))]);
            handle.on_config_change(&config, &changed).await
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert!(slow.unwrap());
        assert!(fast.unwrap());
        assert_eq!(handle.config().await, 11);
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("11"));
    }

    #[tokio::test]
    async fn test_fixed_handle_ignores_changes() {
        let config = MapConfig::with_values([("test.generation", json!(5))]);
        let handle = ReloadableBackendHandle::fixed(Versioned { generation: 1 }, 1);
        assert!(!handle.is_reloadable());

        let changed = ChangedKeys::from(["test.generation".to_string()]);
        assert!(!handle.on_config_change(&config, &changed).await.unwrap());
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("1"));
    }

    #[tokio::test]
    async fn test_listener_applies_published_changes() {
        let config = Arc::new(MapConfig::with_values([("test.generation", json!(1))]));
        let handle = Arc::new(
            ReloadableBackendHandle::<Versioned>::from_source(config.as_ref())
                .await
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let listener = Arc::clone(&handle).spawn_change_listener(
            config.clone(),
            config.subscribe(),
            cancel.clone(),
        );

        config.set("test.generation", json!(7));
        for _ in 0..100 {
            if handle.config().await == 7 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(handle.load("k").await.unwrap(), Bytes::from("7"));

        cancel.cancel();
        listener.await.unwrap();
    }
}
