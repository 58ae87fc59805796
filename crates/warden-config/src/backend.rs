//! Backend KV adapter contract
//!
//! The entire storage contract the configuration store depends on: four
//! operations over string keys and string values. Anything with this shape —
//! an object store, a KV service, a shared directory, the managed ensemble's
//! own hierarchical store — can host the configuration namespace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_common::Result;

/// One entry returned by [`KvBackend::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Full key, including the listed prefix.
    pub key: String,
    /// Stored value.
    pub value: String,
    /// Backend-reported last-modified time, when the backend tracks one.
    pub modified_at: Option<DateTime<Utc>>,
}

impl KvEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            modified_at: None,
        }
    }
}

/// Uniform get/put/list/delete over one physical store.
///
/// Implementations are pure I/O: no retry, no caching, no interpretation of
/// the stored bytes. Visibility of a completed `put` to a subsequent `get` or
/// `list` may be delayed (eventual consistency); callers that care use the
/// settle interval of the pseudo-lock protocol.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read one key. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write one key, overwriting any existing value.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// List all entries whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>>;

    /// Delete one key. Deleting an absent key is a no-op, not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
