//! Warden Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Warden components:
//! - Error types
//! - Owner/process identity helpers
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::WardenError;
pub use utils::{now_millis, owner_id};

/// Key suffix holding the current configuration version (decimal text).
pub const VERSION_KEY: &str = "version";

/// Key suffix holding the serialized configuration payload.
pub const PROPERTIES_KEY: &str = "properties";

/// Namespace suffix under which the store's own lock lives.
pub const LOCK_PREFIX: &str = "lock";

/// Namespace suffix for locks handed to external callers, kept apart from
/// the store's lock so a caller holding one can still invoke `store`.
pub const EXTERNAL_LOCK_PREFIX: &str = "pseudo-locks";

/// Result type used throughout the Warden crates.
pub type Result<T> = std::result::Result<T, WardenError>;
