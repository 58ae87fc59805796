//! Pseudo-lock: mutual exclusion from bare get/put/list/delete
//!
//! For backends with no session or lock primitive (object stores, plain
//! directories). Each acquirer writes a marker key under the lock namespace,
//! waits out the backend's eventual-consistency window, then lists the
//! namespace: whoever's surviving marker sorts first owns the lock. Markers
//! older than the lock timeout belong to holders presumed dead and are
//! pruned; a holder that is merely slow keeps its place until that full
//! timeout has elapsed.
//!
//! Correctness assumptions, stated rather than guaranteed: wall clocks across
//! processes agree within a bound small relative to the lock timeout, and a
//! completed write becomes visible to listings within the settle interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_common::{Result, WardenError, now_millis, owner_id};

use crate::backend::KvBackend;
use crate::lock::{ExclusiveLock, LockSettings};

/// Width of the zero-padded hex timestamp prefix in marker names.
const MILLIS_HEX_WIDTH: usize = 16;

/// Marker-and-ordering lock over a [`KvBackend`].
///
/// One value per acquire/release pair; not reentrant.
pub struct PseudoLock {
    backend: Arc<dyn KvBackend>,
    /// Lock namespace, normalized to end with `/`.
    prefix: String,
    settings: LockSettings,
    /// Our marker key while one exists on the backend.
    marker_key: Option<String>,
}

impl PseudoLock {
    pub fn new(backend: Arc<dyn KvBackend>, prefix: &str, settings: LockSettings) -> Self {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        Self {
            backend,
            prefix,
            settings,
            marker_key: None,
        }
    }

    /// Marker name: zero-padded hex creation millis, then a random token.
    /// Lexicographic order over these names equals (creation time, token)
    /// order, which is the ownership order.
    fn new_marker_key(&self) -> String {
        format!(
            "{}{:0width$x}-{}",
            self.prefix,
            now_millis(),
            Uuid::new_v4().simple(),
            width = MILLIS_HEX_WIDTH
        )
    }

    /// Creation time encoded in a marker key, `None` for keys that do not
    /// follow the marker naming scheme.
    fn marker_millis(&self, key: &str) -> Option<u64> {
        let name = key.strip_prefix(&self.prefix)?;
        let hex = name.get(..MILLIS_HEX_WIDTH)?;
        if name.as_bytes().get(MILLIS_HEX_WIDTH) != Some(&b'-') {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()
    }

    /// One list-prune-decide round. `Ok(true)` when our marker leads.
    async fn check_ownership(&self, own_key: &str) -> Result<bool> {
        let entries = self.backend.list(&self.prefix).await?;
        let now = now_millis();
        let timeout_ms = self.settings.lock_timeout.as_millis() as u64;

        let mut contenders: Vec<&str> = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.key == own_key {
                contenders.push(&entry.key);
                continue;
            }
            let Some(created) = self.marker_millis(&entry.key) else {
                warn!(key = %entry.key, "ignoring foreign entry in lock namespace");
                continue;
            };
            // Reclaim only after the full timeout has elapsed, never eagerly.
            if now.saturating_sub(created) > timeout_ms {
                debug!(key = %entry.key, owner = %entry.value, "pruning expired lock marker");
                if let Err(err) = self.backend.delete(&entry.key).await {
                    warn!(key = %entry.key, %err, "failed to prune expired lock marker");
                }
                continue;
            }
            contenders.push(&entry.key);
        }

        contenders.sort_unstable();
        Ok(contenders.first() == Some(&own_key))
    }

    /// Best-effort removal of our own marker on a failing exit path, so a
    /// failed acquire never leaves a claim behind.
    async fn abandon_marker(&mut self) {
        if let Some(key) = self.marker_key.take() {
            if let Err(err) = self.backend.delete(&key).await {
                warn!(key = %key, %err, "failed to delete own lock marker during cleanup");
            }
        }
    }
}

#[async_trait]
impl ExclusiveLock for PseudoLock {
    async fn acquire(&mut self, timeout: Duration) -> Result<()> {
        if self.marker_key.is_some() {
            return Err(WardenError::IllegalArgument(
                "pseudo-lock is not reentrant: release before re-acquiring".to_string(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let own_key = self.new_marker_key();
        self.backend.put(&own_key, owner_id()).await?;
        self.marker_key = Some(own_key.clone());
        debug!(marker = %own_key, "wrote lock marker");

        let mut pause = self.settings.settle_interval;
        loop {
            tokio::time::sleep(pause.min(deadline.saturating_duration_since(Instant::now())))
                .await;

            match self.check_ownership(&own_key).await {
                Ok(true) => {
                    debug!(marker = %own_key, "pseudo-lock acquired");
                    return Ok(());
                }
                Ok(false) => {}
                Err(err) => {
                    self.abandon_marker().await;
                    return Err(err);
                }
            }

            if Instant::now() >= deadline {
                self.abandon_marker().await;
                warn!(prefix = %self.prefix, ?timeout, "pseudo-lock acquisition timed out");
                return Err(WardenError::LockTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            pause = self.settings.poll_interval;
        }
    }

    async fn release(&mut self) -> Result<()> {
        let Some(key) = self.marker_key.take() else {
            return Ok(());
        };
        if let Err(err) = self.backend.delete(&key).await {
            // Keep the claim so a retried release can still clean up.
            self.marker_key = Some(key);
            return Err(err);
        }
        debug!(marker = %key, "pseudo-lock released");
        Ok(())
    }
}

impl Drop for PseudoLock {
    fn drop(&mut self) {
        if let Some(key) = &self.marker_key {
            warn!(
                marker = %key,
                "pseudo-lock dropped while held; marker will linger until the lock timeout"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn fast_settings() -> LockSettings {
        LockSettings {
            lock_timeout: Duration::from_secs(60),
            settle_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn lock_over(backend: &Arc<MemoryBackend>, settings: LockSettings) -> PseudoLock {
        let backend: Arc<dyn KvBackend> = backend.clone();
        PseudoLock::new(backend, "cfg/lock", settings)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let backend = Arc::new(MemoryBackend::new());
        let mut lock = lock_over(&backend, fast_settings());

        lock.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(backend.list("cfg/lock/").await.unwrap().len(), 1);

        lock.release().await.unwrap();
        assert!(backend.list("cfg/lock/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_acquirer_waits_for_release() {
        let backend = Arc::new(MemoryBackend::new());
        let mut first = lock_over(&backend, fast_settings());
        let mut second = lock_over(&backend, fast_settings());

        first.acquire(Duration::from_secs(1)).await.unwrap();
        let err = second.acquire(Duration::from_millis(80)).await.unwrap_err();
        assert!(matches!(err, WardenError::LockTimeout { .. }));
        // The failed attempt cleaned up after itself.
        assert_eq!(backend.list("cfg/lock/").await.unwrap().len(), 1);

        first.release().await.unwrap();
        second.acquire(Duration::from_secs(1)).await.unwrap();
        second.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let mut lock = lock_over(&backend, fast_settings());
        lock.acquire(Duration::from_secs(1)).await.unwrap();

        lock.release().await.unwrap();
        lock.release().await.unwrap();
        lock.release().await.unwrap();
        assert!(backend.list("cfg/lock/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_foreign_marker_is_not_preempted() {
        let backend = Arc::new(MemoryBackend::new());
        // A live competitor wrote its marker just now and never releases.
        let early = format!("cfg/lock/{:016x}-{}", now_millis() - 50, "a".repeat(32));
        backend.put(&early, "slow-holder").await.unwrap();

        let mut lock = lock_over(&backend, fast_settings());
        let err = lock.acquire(Duration::from_millis(80)).await.unwrap_err();
        assert!(matches!(err, WardenError::LockTimeout { .. }));
        // The slow holder's marker must survive the failed attempt.
        assert_eq!(backend.get(&early).await.unwrap(), Some("slow-holder".into()));
    }

    #[tokio::test]
    async fn test_expired_marker_is_reclaimed() {
        let mut settings = fast_settings();
        settings.lock_timeout = Duration::from_millis(100);

        let backend = Arc::new(MemoryBackend::new());
        let stale = format!("cfg/lock/{:016x}-{}", now_millis() - 10_000, "b".repeat(32));
        backend.put(&stale, "crashed-holder").await.unwrap();

        let mut lock = lock_over(&backend, settings);
        lock.acquire(Duration::from_secs(1)).await.unwrap();
        // The orphan was pruned on the way in.
        assert_eq!(backend.get(&stale).await.unwrap(), None);
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_ownership_order_is_time_then_token() {
        let backend = Arc::new(MemoryBackend::new());
        let mut lock = lock_over(&backend, fast_settings());

        // A competitor that arrived later must not win even while we wait.
        lock.acquire(Duration::from_secs(1)).await.unwrap();
        let late = format!("cfg/lock/{:016x}-{}", now_millis() + 1_000, "0".repeat(32));
        backend.put(&late, "late-arrival").await.unwrap();
        assert!(lock.check_ownership(lock.marker_key.as_deref().unwrap()).await.unwrap());
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_reacquire_before_release_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let mut lock = lock_over(&backend, fast_settings());
        lock.acquire(Duration::from_secs(1)).await.unwrap();
        let err = lock.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, WardenError::IllegalArgument(_)));
        lock.release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_owner_under_visibility_delay() {
        let backend = Arc::new(MemoryBackend::with_visibility_delay(Duration::from_millis(
            20,
        )));
        let settings = LockSettings {
            lock_timeout: Duration::from_secs(60),
            // Settle must cover the visibility delay for the protocol to hold.
            settle_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let backend = backend.clone();
            let settings = settings.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let backend: Arc<dyn KvBackend> = backend;
                let mut lock = PseudoLock::new(backend, "cfg/lock", settings);
                lock.acquire(Duration::from_secs(10)).await.unwrap();
                let inside = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                max_seen.fetch_max(inside, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                lock.release().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_marker_millis_parsing() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let lock = PseudoLock::new(backend, "cfg/lock", LockSettings::default());

        let key = format!("cfg/lock/{:016x}-abc", 0x1234u64);
        assert_eq!(lock.marker_millis(&key), Some(0x1234));
        assert_eq!(lock.marker_millis("cfg/lock/garbage"), None);
        assert_eq!(lock.marker_millis("elsewhere/0000000000001234-abc"), None);
    }
}
