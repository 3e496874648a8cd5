//! Sync configuration parsed from environment variables.
//!
//! Every knob has a default in [`crate::consts`]; a missing or unparsable
//! variable silently falls back to it.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::time::Duration;

use crate::consts::{
    DEFAULT_COALESCE_WINDOW_MS, DEFAULT_FRAME_INTERVAL_MS, DEFAULT_HISTORY_LIMIT, DEFAULT_LOCK_TTL_MS,
    DEFAULT_RECONCILE_GRACE_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Lease lifetime before a lock counts as expired.
    pub lock_ttl_ms: i64,
    /// Quiet period that closes a coalescing history transaction.
    pub coalesce_window_ms: i64,
    /// Flush interval for buffered remote events.
    pub frame_interval_ms: u64,
    /// Maximum undo entries retained.
    pub history_limit: usize,
    /// Grace period for optimistic-only shapes to be confirmed by the stream.
    pub reconcile_grace_ms: i64,
}

impl SyncConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `SHAPESYNC_LOCK_TTL_MS`: default 30000
    /// - `SHAPESYNC_COALESCE_WINDOW_MS`: default 500
    /// - `SHAPESYNC_FRAME_INTERVAL_MS`: default 16
    /// - `SHAPESYNC_HISTORY_LIMIT`: default 100
    /// - `SHAPESYNC_RECONCILE_GRACE_MS`: default 10000
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            lock_ttl_ms: env_parse("SHAPESYNC_LOCK_TTL_MS", DEFAULT_LOCK_TTL_MS),
            coalesce_window_ms: env_parse("SHAPESYNC_COALESCE_WINDOW_MS", DEFAULT_COALESCE_WINDOW_MS),
            frame_interval_ms: env_parse("SHAPESYNC_FRAME_INTERVAL_MS", DEFAULT_FRAME_INTERVAL_MS).max(1),
            history_limit: env_parse("SHAPESYNC_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT),
            reconcile_grace_ms: env_parse("SHAPESYNC_RECONCILE_GRACE_MS", DEFAULT_RECONCILE_GRACE_MS),
        }
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            reconcile_grace_ms: DEFAULT_RECONCILE_GRACE_MS,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
