//! Error types for Warden

use std::fmt::Display;

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum WardenError {
    /// I/O failure reaching the configuration backend. Never retried inside
    /// the core; retry policy belongs to the caller.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Stored payload could not be decoded.
    #[error("parse error at '{key}': {message}")]
    ParseError { key: String, message: String },

    /// Mutual exclusion was not obtained within the requested window.
    #[error("lock not acquired within {timeout_ms} ms")]
    LockTimeout { timeout_ms: u64 },

    /// The CAS update helper exhausted its attempt budget; every attempt lost
    /// the race to another writer.
    #[error("conflicting writers won {attempts} consecutive store attempts")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error("invalid property key '{0}': keys must not contain '=' or newlines")]
    InvalidKey(String),

    #[error("invalid argument: {0}")]
    IllegalArgument(String),
}

impl WardenError {
    /// Wrap an arbitrary I/O-ish error as a backend failure.
    pub fn backend(err: impl Display) -> Self {
        WardenError::BackendUnavailable(err.to_string())
    }

    /// True for errors a caller may reasonably retry at its own cadence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WardenError::BackendUnavailable(_) | WardenError::LockTimeout { .. }
        )
    }
}
