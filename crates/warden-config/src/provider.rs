//! Configuration provider facade
//!
//! One instance per process, pointed at a shared backend namespace. `load` is
//! lock-free; `store` takes the namespace lock, re-checks the version inside
//! it, and either commits `expected + 1` or reports a conflict. Conflicts are
//! ordinary return values: racing writers are expected, and the caller's
//! read-modify-write loop (packaged as [`ConfigProvider::update`]) absorbs
//! them.
//!
//! The version is re-checked inside the lock rather than trusting the
//! caller's pre-lock read: the lock only serializes writers, so an
//! `expected_version` obtained before acquisition may already be stale by the
//! time the lock is granted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use warden_common::{
    EXTERNAL_LOCK_PREFIX, LOCK_PREFIX, PROPERTIES_KEY, Result, VERSION_KEY, WardenError,
};

use crate::backend::KvBackend;
use crate::lock::{ExclusiveLock, LockSettings};
use crate::native_lock::{NativeLock, SessionLockBackend};
use crate::properties::{
    VersionedProperties, merge_defaults, parse_properties, parse_version, serialize_properties,
    validate_keys,
};
use crate::pseudo_lock::PseudoLock;

/// Which mutual-exclusion variant guards the namespace, chosen per backend
/// capability at construction.
#[derive(Clone)]
pub enum LockMode {
    /// Marker-and-ordering lock over the backend's own get/put/list/delete.
    Pseudo,
    /// The backend's native session/lock primitive.
    Native(Arc<dyn SessionLockBackend>),
}

/// Result of a store attempt. A conflict is an expected, recoverable outcome
/// of racing writers, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The write committed; carries the new snapshot.
    Committed(VersionedProperties),
    /// Another writer got there first; nothing was written, no version was
    /// consumed. Reload and retry.
    Conflict { current_version: i64 },
}

impl StoreOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreOutcome::Conflict { .. })
    }
}

/// Facade over one shared configuration namespace.
///
/// Stateless beyond its backend handle, path prefixes, and local defaults;
/// each process holds its own instance pointed at the same namespace.
pub struct ConfigProvider {
    backend: Arc<dyn KvBackend>,
    defaults: BTreeMap<String, String>,
    lock_mode: LockMode,
    lock_settings: LockSettings,
    /// Window `store()` waits for the namespace lock.
    acquire_timeout: Duration,
    version_key: String,
    properties_key: String,
    lock_prefix: String,
    external_lock_prefix: String,
}

impl ConfigProvider {
    /// `prefix` is the namespace root; `defaults` fill keys absent from the
    /// stored payload at load time (stored values always win) and are never
    /// written back implicitly.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        prefix: &str,
        defaults: BTreeMap<String, String>,
    ) -> Self {
        let base = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        Self {
            backend,
            defaults,
            lock_mode: LockMode::Pseudo,
            lock_settings: LockSettings::default(),
            acquire_timeout: Duration::from_secs(5 * 60),
            version_key: format!("{base}{VERSION_KEY}"),
            properties_key: format!("{base}{PROPERTIES_KEY}"),
            lock_prefix: format!("{base}{LOCK_PREFIX}/"),
            external_lock_prefix: format!("{base}{EXTERNAL_LOCK_PREFIX}/"),
        }
    }

    pub fn with_lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    pub fn with_lock_settings(mut self, settings: LockSettings) -> Self {
        self.lock_settings = settings;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Read the current snapshot. No lock is taken: a concurrent writer may
    /// supersede the returned version at any moment, and the next `store`'s
    /// version check will catch the staleness.
    ///
    /// A namespace nothing was ever stored into reads as defaults at
    /// version 0.
    pub async fn load(&self) -> Result<VersionedProperties> {
        let version = parse_version(
            self.backend.get(&self.version_key).await?.as_deref(),
            &self.version_key,
        )?;
        let stored = match self.backend.get(&self.properties_key).await? {
            Some(raw) => parse_properties(&raw, &self.properties_key)?,
            None => BTreeMap::new(),
        };
        Ok(VersionedProperties::new(
            merge_defaults(stored, &self.defaults),
            version,
        ))
    }

    /// Store `properties` iff the namespace is still at `expected_version`.
    ///
    /// Takes the namespace lock before touching the backend, re-reads the
    /// version inside it, then writes the payload followed by the version
    /// counter. The lock is released on every exit path; a mid-write backend
    /// error propagates after release.
    pub async fn store(
        &self,
        properties: BTreeMap<String, String>,
        expected_version: i64,
    ) -> Result<StoreOutcome> {
        validate_keys(&properties)?;
        let payload = serialize_properties(&properties);

        let mut lock = self.namespace_lock();
        lock.acquire(self.acquire_timeout).await?;
        let result = self
            .store_locked(properties, &payload, expected_version)
            .await;
        if let Err(err) = lock.release().await {
            // The write outcome stands; an unreleased marker or session is
            // reclaimed by timeout/expiry.
            warn!(%err, "failed to release namespace lock after store");
        }
        result
    }

    async fn store_locked(
        &self,
        properties: BTreeMap<String, String>,
        payload: &str,
        expected_version: i64,
    ) -> Result<StoreOutcome> {
        let current = parse_version(
            self.backend.get(&self.version_key).await?.as_deref(),
            &self.version_key,
        )?;
        if current != expected_version {
            debug!(
                expected = expected_version,
                current, "store rejected: version moved"
            );
            return Ok(StoreOutcome::Conflict {
                current_version: current,
            });
        }

        // Payload first, version last: a crash between the two writes leaves
        // the old version in place, so no reader treats the torn state as a
        // committed snapshot.
        self.backend.put(&self.properties_key, payload).await?;
        let new_version = expected_version + 1;
        self.backend
            .put(&self.version_key, &new_version.to_string())
            .await?;
        info!(version = new_version, "configuration stored");
        Ok(StoreOutcome::Committed(VersionedProperties::new(
            properties,
            new_version,
        )))
    }

    /// The lock guarding this namespace's writes.
    fn namespace_lock(&self) -> Box<dyn ExclusiveLock> {
        match &self.lock_mode {
            LockMode::Pseudo => Box::new(PseudoLock::new(
                self.backend.clone(),
                &self.lock_prefix,
                self.lock_settings.clone(),
            )),
            LockMode::Native(sessions) => Box::new(NativeLock::with_poll_interval(
                sessions.clone(),
                self.lock_prefix.trim_end_matches('/'),
                self.lock_settings.poll_interval,
            )),
        }
    }

    /// A fresh lock for callers needing exclusion that spans more than one
    /// `load`/`store` call (a multi-step migration, an ensemble
    /// reconfiguration). Lives in its own marker namespace, so holding it
    /// while calling `store` cannot deadlock against the store's internal
    /// lock.
    pub fn new_lock(&self) -> Box<dyn ExclusiveLock> {
        Box::new(PseudoLock::new(
            self.backend.clone(),
            &self.external_lock_prefix,
            self.lock_settings.clone(),
        ))
    }

    /// The canonical read-modify-write loop: load, apply `mutate`, store with
    /// the loaded version, retry on conflict. `store` itself never retries;
    /// the attempt budget here is the caller's livelock bound.
    pub async fn update<F>(&self, mut mutate: F, max_attempts: u32) -> Result<VersionedProperties>
    where
        F: FnMut(BTreeMap<String, String>) -> BTreeMap<String, String> + Send,
    {
        for attempt in 1..=max_attempts {
            let loaded = self.load().await?;
            let next = mutate(loaded.properties);
            match self.store(next, loaded.version).await? {
                StoreOutcome::Committed(snapshot) => return Ok(snapshot),
                StoreOutcome::Conflict { current_version } => {
                    debug!(attempt, current_version, "config update lost the race, retrying");
                }
            }
        }
        Err(WardenError::ConflictRetriesExhausted {
            attempts: max_attempts,
        })
    }
}
