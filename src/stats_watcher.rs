//! Stats Watcher - Periodic Statistics Polling
//!
//! Polls a backend's [`Stats`] on a fixed interval from one background task
//! and hands every result, success or failure, to a sink.
//!
//! ```text
//! Idle --watch--> Running --close / cancel--> Stopped
//!   \------------------close------------------^
//! ```

use crate::error::Result;
use crate::stats::Stats;
use crate::traits::CacheBackend;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest polling interval accepted
const MIN_INTERVAL: Duration = Duration::from_millis(1);

enum WatchState {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Periodic stats poller
///
/// At most one background task runs per watcher. The first poll happens one
/// interval after [`StatsWatcher::watch`]. [`StatsWatcher::close`] is the
/// canonical shutdown; dropping the watcher only signals the task to stop.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tiered_cache::backends::MokaCache;
/// use tiered_cache::StatsWatcher;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let watcher = StatsWatcher::new(Arc::new(MokaCache::default()), Duration::from_secs(10));
/// watcher.watch(CancellationToken::new(), |result| match result {
///     Ok(stats) => tracing::info!(%stats, "cache stats"),
///     Err(e) => tracing::warn!(error = %e, "cache stats unavailable"),
/// });
/// // ...
/// watcher.close().await;
/// # }
/// ```
pub struct StatsWatcher {
    cache: Arc<dyn CacheBackend>,
    interval: Duration,
    state: Mutex<WatchState>,
    shutdown: CancellationToken,
}

impl StatsWatcher {
    /// Create an idle watcher polling `cache` every `interval`
    #[must_use]
    pub fn new(cache: Arc<dyn CacheBackend>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, min = ?MIN_INTERVAL, "[StatsWatcher] Interval too short, clamping");
        }
        Self {
            cache,
            interval: interval.max(MIN_INTERVAL),
            state: Mutex::new(WatchState::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    /// Polling interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` while the background task is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        match &*self.state.lock() {
            WatchState::Running(handle) => !handle.is_finished(),
            WatchState::Idle | WatchState::Stopped => false,
        }
    }

    /// Start polling, delivering every result to `sink`
    ///
    /// Only the first call on an idle watcher starts the task; later calls,
    /// or calls after [`StatsWatcher::close`], are no-ops and return `false`.
    /// The task also stops when `cancel` fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch<F>(&self, cancel: CancellationToken, sink: F) -> bool
    where
        F: Fn(Result<Stats>) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if !matches!(*state, WatchState::Idle) {
            debug!("[StatsWatcher] Already started, ignoring watch");
            return false;
        }

        let cache = Arc::clone(&self.cache);
        let shutdown = self.shutdown.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = cancel.cancelled() => {
                        debug!("[StatsWatcher] Cancelled by caller");
                        break;
                    }
                    _ = ticker.tick() => sink(cache.stats().await),
                }
            }
            debug!(backend = cache.name(), "[StatsWatcher] Polling stopped");
        });

        info!(backend = self.cache.name(), interval = ?period, "[StatsWatcher] Polling started");
        *state = WatchState::Running(handle);
        true
    }

    /// Stop polling and wait for the background task to finish
    ///
    /// Idempotent, and terminal: the watcher cannot be started again.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let previous = std::mem::replace(&mut *self.state.lock(), WatchState::Stopped);
        if let WatchState::Running(handle) = previous {
            if let Err(e) = handle.await {
                warn!(error = %e, "[StatsWatcher] Polling task ended abnormally");
            }
        }
    }
}

impl Drop for StatsWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
