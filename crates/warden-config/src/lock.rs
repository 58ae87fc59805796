//! Exclusive lock contract
//!
//! One contract, two implementations: `PseudoLock` for backends that offer
//! only get/put/list/delete, `NativeLock` for backends with a session or lock
//! primitive of their own. The configuration store is written against this
//! trait and does not know which variant it holds.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_common::Result;

/// Advisory mutual exclusion around the configuration store's critical
/// sections.
///
/// Single-holder: one value, one acquire/release pair. Re-acquiring before
/// release is undefined and must not be relied upon. `acquire` either returns
/// truly holding the lock or fails having already cleaned up any marker or
/// session it created — it never leaves a dangling claim behind a failure.
#[async_trait]
pub trait ExclusiveLock: Send {
    /// Block for up to `timeout` trying to obtain exclusion.
    /// Fails with `LockTimeout` when the window elapses.
    async fn acquire(&mut self, timeout: Duration) -> Result<()>;

    /// Give up the lock. Idempotent: releasing an unheld lock is a no-op.
    async fn release(&mut self) -> Result<()>;
}

/// Tuning for lock acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Age after which another acquirer may treat a marker as orphaned and
    /// reclaim the lock. Must comfortably exceed the longest critical
    /// section; a holder that is merely slow is never preempted early.
    #[serde(with = "duration_millis")]
    pub lock_timeout: Duration,

    /// Pause after writing a marker before trusting a listing, covering the
    /// backend's eventual-consistency window. Shorter risks two acquirers
    /// each seeing only their own marker; longer costs latency on every
    /// acquisition.
    #[serde(with = "duration_millis")]
    pub settle_interval: Duration,

    /// Cadence for re-polling while another holder is ahead in line.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5 * 60),
            settle_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
