//! Hot-swappable backend handle
//!
//! Lets an operator replace backend credentials or endpoints at runtime
//! without interrupting in-flight calls. Every operation clones the current
//! `Arc` before awaiting, so a swapped-out client survives until its last
//! in-flight caller drops the reference, then tears down normally.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;
use warden_common::Result;

use crate::backend::{KvBackend, KvEntry};

/// Ref-counted, atomically swappable [`KvBackend`] wrapper.
pub struct SwappableBackend {
    inner: RwLock<Arc<dyn KvBackend>>,
}

impl SwappableBackend {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            inner: RwLock::new(backend),
        }
    }

    /// Replace the delegate. In-flight calls keep the client they started
    /// with; new calls see the replacement immediately.
    pub fn swap(&self, backend: Arc<dyn KvBackend>) {
        info!("swapping configuration backend client");
        *self.inner.write() = backend;
    }

    fn current(&self) -> Arc<dyn KvBackend> {
        self.inner.read().clone()
    }
}

#[async_trait]
impl KvBackend for SwappableBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.current().get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.current().put(key, value).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        self.current().list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.current().delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[tokio::test]
    async fn test_swap_redirects_new_calls() {
        let a = Arc::new(MemoryBackend::new());
        let b = Arc::new(MemoryBackend::new());
        a.put("k", "from-a").await.unwrap();
        b.put("k", "from-b").await.unwrap();

        let swappable = SwappableBackend::new(a.clone());
        assert_eq!(swappable.get("k").await.unwrap(), Some("from-a".into()));

        swappable.swap(b.clone());
        assert_eq!(swappable.get("k").await.unwrap(), Some("from-b".into()));
    }

    #[tokio::test]
    async fn test_swapped_out_client_survives_outstanding_reference() {
        let a: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let swappable = SwappableBackend::new(a.clone());

        let held = swappable.current();
        swappable.swap(Arc::new(MemoryBackend::new()));

        // The old client is still usable through the outstanding reference.
        held.put("k", "late-write").await.unwrap();
        assert_eq!(held.get("k").await.unwrap(), Some("late-write".into()));
        assert_eq!(Arc::strong_count(&a), 2);
        drop(held);
        assert_eq!(Arc::strong_count(&a), 1);
    }
}
