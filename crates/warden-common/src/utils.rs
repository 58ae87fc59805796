//! Utility functions for Warden
//!
//! Identity and clock helpers used by the lock and config components.

use std::sync::LazyLock;

use chrono::Utc;

static OWNER_ID: LazyLock<String> = LazyLock::new(|| {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "warden-node".to_string());
    format!("{}-{}", host, std::process::id())
});

/// Identity of this process, used to tag lock markers and sessions.
///
/// Hostname plus PID; stable for the lifetime of the process. Diagnostic
/// only — marker ordering never depends on it.
pub fn owner_id() -> &'static str {
    &OWNER_ID
}

/// Current wall-clock time in milliseconds since the unix epoch.
///
/// Pseudo-lock ordering and expiry compare these values across processes,
/// so bounded clock skew is an explicit correctness assumption.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
