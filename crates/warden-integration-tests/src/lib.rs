//! Shared helpers for the Warden integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use warden_config::{ConfigProvider, KvBackend, LockSettings};

/// Lock tuning tight enough for tests while keeping the settle/poll shape of
/// a production deployment.
pub fn fast_lock_settings() -> LockSettings {
    LockSettings {
        lock_timeout: Duration::from_secs(60),
        settle_interval: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
    }
}

/// A provider over `backend` with no local defaults and test lock tuning.
pub fn test_provider(backend: Arc<dyn KvBackend>, prefix: &str) -> ConfigProvider {
    ConfigProvider::new(backend, prefix, BTreeMap::new())
        .with_lock_settings(fast_lock_settings())
        .with_acquire_timeout(Duration::from_secs(10))
}

/// Shorthand for building a properties map.
pub fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
