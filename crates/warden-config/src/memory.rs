//! In-memory backend
//!
//! Used for single-process deployments and throughout the test suites. The
//! optional visibility delay makes a write invisible to `get`/`list` for a
//! configured window, approximating an eventually-consistent remote store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;
use warden_common::Result;

use crate::backend::{KvBackend, KvEntry};
use crate::native_lock::SessionLockBackend;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Value observable before `visible_at` is reached, if any.
    shadow: Option<String>,
    visible_at: Instant,
    modified_at: chrono::DateTime<Utc>,
}

/// DashMap-backed [`KvBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredValue>,
    visibility_delay: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose writes only become visible after `delay`, for
    /// exercising the pseudo-lock's settle behavior.
    pub fn with_visibility_delay(delay: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            visibility_delay: delay,
        }
    }

    fn observable(&self, stored: &StoredValue) -> Option<String> {
        if Instant::now() >= stored.visible_at {
            Some(stored.value.clone())
        } else {
            stored.shadow.clone()
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(key)
            .and_then(|stored| self.observable(&stored)))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let visible_at = Instant::now() + self.visibility_delay;
        let shadow = self
            .entries
            .get(key)
            .and_then(|stored| self.observable(&stored));
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                shadow,
                visible_at,
                modified_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        let mut out = Vec::new();
        for item in self.entries.iter() {
            if !item.key().starts_with(prefix) {
                continue;
            }
            if let Some(value) = self.observable(item.value()) {
                out.push(KvEntry {
                    key: item.key().clone(),
                    value,
                    modified_at: Some(item.value().modified_at),
                });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// In-process [`SessionLockBackend`] for tests and single-node mode.
///
/// One session may hold a given lock key at a time; sessions are plain UUIDs
/// with no TTL (a remote implementation would expire them server-side).
#[derive(Default)]
pub struct MemorySessionBackend {
    holders: DashMap<String, HeldSession>,
}

#[derive(Debug, Clone)]
struct HeldSession {
    session: String,
    #[allow(dead_code)] // Diagnostic only, surfaced when inspecting deadlocks
    owner: String,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session currently holding `key`, if any.
    pub fn holder(&self, key: &str) -> Option<String> {
        self.holders.get(key).map(|h| h.session.clone())
    }
}

#[async_trait]
impl SessionLockBackend for MemorySessionBackend {
    async fn try_acquire(&self, key: &str, owner: &str) -> Result<Option<String>> {
        let session = Uuid::new_v4().to_string();
        match self.holders.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(vacant) => {
                vacant.insert(HeldSession {
                    session: session.clone(),
                    owner: owner.to_string(),
                });
                Ok(Some(session))
            }
        }
    }

    async fn release(&self, key: &str, session: &str) -> Result<()> {
        self.holders
            .remove_if(key, |_, held| held.session == session);
        Ok(())
    }
}
