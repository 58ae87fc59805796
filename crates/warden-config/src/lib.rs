//! Warden Config - Versioned shared-configuration store
//!
//! Several independent supervisor processes share one configuration blob
//! through a remote key-value backend that may offer no atomic compare-and-swap,
//! no locking, and only eventual consistency. This crate provides:
//! - `KvBackend`: the four-operation adapter contract (get/put/list/delete)
//! - `VersionedProperties`: the version-stamped configuration value and its codec
//! - `PseudoLock`: mutual exclusion built purely from get/put/list/delete
//! - `NativeLock`: the same contract over a backend's own session/lock primitive
//! - `ConfigProvider`: the load / store-with-expected-version facade
//!
//! Callers mutate configuration exclusively through the optimistic
//! read-modify-write loop (load, mutate, store with the loaded version, retry
//! on conflict). `ConfigProvider::update` packages that loop.

pub mod backend;
pub mod lock;
pub mod memory;
pub mod native_lock;
pub mod properties;
pub mod provider;
pub mod pseudo_lock;
pub mod swap;

// Re-export commonly used types
pub use backend::{KvBackend, KvEntry};
pub use lock::{ExclusiveLock, LockSettings};
pub use memory::{MemoryBackend, MemorySessionBackend};
pub use native_lock::{NativeLock, SessionLockBackend};
pub use properties::VersionedProperties;
pub use provider::{ConfigProvider, LockMode, StoreOutcome};
pub use pseudo_lock::PseudoLock;
pub use swap::SwappableBackend;
