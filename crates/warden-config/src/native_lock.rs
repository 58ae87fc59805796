//! Native-lock adapter
//!
//! For backends that bring their own session or lock primitive (a KV service
//! with server-side sessions, the managed ensemble itself). The adapter maps
//! the backend's try-acquire/release surface onto the same [`ExclusiveLock`]
//! contract as the pseudo-lock, so the configuration store is backend-agnostic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use warden_common::{Result, WardenError, owner_id};

use crate::lock::ExclusiveLock;

/// The session/lock capability a backend must expose for native locking.
#[async_trait]
pub trait SessionLockBackend: Send + Sync {
    /// Try once to take `key`. Returns the session id on success, `None`
    /// when another session holds it. Never blocks waiting for the holder.
    async fn try_acquire(&self, key: &str, owner: &str) -> Result<Option<String>>;

    /// Destroy `session`'s claim on `key`. Releasing a session that no
    /// longer holds the key is a no-op.
    async fn release(&self, key: &str, session: &str) -> Result<()>;
}

/// [`ExclusiveLock`] over a backend-native session lock.
///
/// Polls `try_acquire` until the backend grants the key or the timeout
/// elapses; the backend's own session expiry handles crashed holders, so
/// there is no marker pruning on this path.
pub struct NativeLock {
    sessions: Arc<dyn SessionLockBackend>,
    lock_key: String,
    poll_interval: Duration,
    session: Option<String>,
}

impl NativeLock {
    pub fn new(sessions: Arc<dyn SessionLockBackend>, lock_key: &str) -> Self {
        Self::with_poll_interval(sessions, lock_key, Duration::from_millis(250))
    }

    pub fn with_poll_interval(
        sessions: Arc<dyn SessionLockBackend>,
        lock_key: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            sessions,
            lock_key: lock_key.to_string(),
            poll_interval,
            session: None,
        }
    }
}

#[async_trait]
impl ExclusiveLock for NativeLock {
    async fn acquire(&mut self, timeout: Duration) -> Result<()> {
        if self.session.is_some() {
            return Err(WardenError::IllegalArgument(
                "native lock is not reentrant: release before re-acquiring".to_string(),
            ));
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(session) = self.sessions.try_acquire(&self.lock_key, owner_id()).await? {
                debug!(key = %self.lock_key, %session, "native lock acquired");
                self.session = Some(session);
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(key = %self.lock_key, ?timeout, "native lock acquisition timed out");
                return Err(WardenError::LockTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(
                self.poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
            )
            .await;
        }
    }

    async fn release(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if let Err(err) = self.sessions.release(&self.lock_key, &session).await {
            self.session = Some(session);
            return Err(err);
        }
        debug!(key = %self.lock_key, "native lock released");
        Ok(())
    }
}

impl Drop for NativeLock {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                key = %self.lock_key,
                "native lock dropped while held; waiting on backend session expiry"
            );
        }
    }
}
