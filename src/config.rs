//! Configuration Lookup and Change Notification
//!
//! Backends that support hot reconfiguration read their settings through a
//! [`ConfigSource`] (a "get value by key" lookup) and are told about changes
//! with a set of changed keys. Loading configuration from environment, files or
//! remote stores is left to the application: anything that can answer
//! [`ConfigSource::get`] works.
//!
//! [`MapConfig`] is a small in-process source that publishes changed keys on a
//! broadcast channel, enough for tests and for applications that push
//! configuration themselves.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Keys whose value changed in one configuration update
pub type ChangedKeys = HashSet<String>;

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Read access to configuration values
pub trait ConfigSource: Send + Sync {
    /// Current value for `key`, or `None` if it is not set
    fn get(&self, key: &str) -> Option<Value>;
}

/// Typed lookups on top of [`ConfigSource`]
pub trait ConfigSourceExt {
    /// Value for `key` converted to `T`, or `default` when the key is unset or
    /// holds a value of the wrong shape.
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T;
}

impl<S: ConfigSource + ?Sized> ConfigSourceExt for S {
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = self.get(key) else {
            return default;
        };
        match serde_json::from_value(value) {
            Ok(typed) => typed,
            Err(e) => {
                warn!(key = %key, error = %e, "Config value has unexpected type, using default");
                default
            }
        }
    }
}

/// In-process configuration map with change notifications
///
/// **Example**:
/// ```rust
/// use tiered_cache::config::{ConfigSource, ConfigSourceExt, MapConfig};
/// use serde_json::json;
///
/// let config = MapConfig::new();
/// let mut changes = config.subscribe();
///
/// config.set("cache.memory.capacity_bytes", json!(1_048_576));
///
/// assert_eq!(config.get_or("cache.memory.capacity_bytes", 0_u64), 1_048_576);
/// assert!(changes.try_recv().unwrap().contains("cache.memory.capacity_bytes"));
/// ```
#[derive(Debug)]
pub struct MapConfig {
    values: DashMap<String, Value>,
    changes: broadcast::Sender<ChangedKeys>,
}

impl MapConfig {
    /// Create an empty configuration
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: DashMap::new(),
            changes,
        }
    }

    /// Create a configuration pre-populated with `entries` (no notification)
    #[must_use]
    pub fn with_values<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let config = Self::new();
        for (key, value) in entries {
            config.values.insert(key.into(), value);
        }
        config
    }

    /// Subscribe to changed-key notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangedKeys> {
        self.changes.subscribe()
    }

    /// Set a single value, notifying subscribers if it changed
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        !self.update([(key.into(), value)]).is_empty()
    }

    /// Apply several values at once and publish one notification listing every
    /// key whose value actually changed. Returns the changed keys.
    pub fn update<I, K>(&self, entries: I) -> ChangedKeys
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut changed = ChangedKeys::new();
        for (key, value) in entries {
            let key = key.into();
            let previous = self.values.insert(key.clone(), value.clone());
            if previous.as_ref() != Some(&value) {
                changed.insert(key);
            }
        }
        self.publish(changed)
    }

    /// Remove a key, notifying subscribers if it was set
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.values.remove(key).is_some();
        if removed {
            self.publish(ChangedKeys::from([key.to_string()]));
        }
        removed
    }

    fn publish(&self, changed: ChangedKeys) -> ChangedKeys {
        if !changed.is_empty() {
            debug!(keys = ?changed, "Configuration changed");
            // No subscribers is fine
            let _ = self.changes.send(changed.clone());
        }
        changed
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_or_falls_back_on_missing_or_mistyped() {
        let config = MapConfig::with_values([("a", json!("not a number")), ("b", json!(7))]);
        assert_eq!(config.get_or("a", 1_u64), 1);
        assert_eq!(config.get_or("b", 1_u64), 7);
        assert_eq!(config.get_or("missing", 3_u64), 3);
        assert_eq!(
            config.get_or("missing", vec!["127.0.0.1:6379".to_string()]),
            vec!["127.0.0.1:6379".to_string()]
        );
    }

    #[test]
    fn test_update_publishes_only_changed_keys() {
        let config = MapConfig::with_values([("same", json!(1))]);
        let mut rx = config.subscribe();

        let changed = config.update([("same", json!(1)), ("new", json!(2))]);
        assert_eq!(changed, ChangedKeys::from(["new".to_string()]));
        assert_eq!(rx.try_recv().unwrap(), changed);

        // Nothing changed, nothing published
        assert!(!config.set("same", json!(1)));
        assert!(rx.try_recv().is_err());

        assert!(config.remove("new"));
        assert!(rx.try_recv().unwrap().contains("new"));
    }
}
