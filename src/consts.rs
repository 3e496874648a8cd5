//! Shared numeric defaults for the sync core.

// ── Locks ───────────────────────────────────────────────────────

/// Lease lifetime in milliseconds before another client may take the lock.
pub const DEFAULT_LOCK_TTL_MS: i64 = 30_000;

// ── History ─────────────────────────────────────────────────────

/// Quiet period that closes a coalescing transaction, in milliseconds.
pub const DEFAULT_COALESCE_WINDOW_MS: i64 = 500;

/// Maximum number of undo entries retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// ── Sync ────────────────────────────────────────────────────────

/// Flush interval for buffered remote events (one display frame at 60 Hz).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// How long an optimistic-only shape may stay unconfirmed before it is logged.
pub const DEFAULT_RECONCILE_GRACE_MS: i64 = 10_000;

// ── Store ───────────────────────────────────────────────────────

/// Removal tombstones kept per store; the oldest are forgotten first.
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 4096;

// ── Text metrics ────────────────────────────────────────────────

/// Average glyph advance as a fraction of the font size.
pub const TEXT_CHAR_WIDTH_RATIO: f64 = 0.6;

/// Line height as a fraction of the font size.
pub const TEXT_LINE_HEIGHT_RATIO: f64 = 1.2;
