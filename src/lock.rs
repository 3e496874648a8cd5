//! Lock manager — short-lived advisory write leases per shape.
//!
//! DESIGN
//! ======
//! A lease is the `(locked_by, locked_at)` pair on the shape itself, so lock
//! state travels through the same sync stream as every other field. A lease
//! can be taken when the shape is unlocked, already held by the requester
//! (which renews it), or older than the TTL. Anything else is a conflict the
//! caller must surface instead of overwriting.
//!
//! TRADE-OFFS
//! ==========
//! Leases are advisory: the remote store does not check them, so a client
//! that ignores them can still write. Expiry keeps a crashed client from
//! blocking a shape forever.

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;

use std::collections::HashSet;

use tracing::{debug, info};

use crate::clock;
use crate::error::ErrorCode;
use crate::shape::{ClientId, Shape, ShapeId, ShapePatch};
use crate::store::ShapeStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("shape {shape_id} is locked by {holder}")]
    Conflict { shape_id: ShapeId, holder: ClientId },
    #[error("shape not found: {0}")]
    NotFound(ShapeId),
}

impl ErrorCode for LockError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "E_LOCK_CONFLICT",
            Self::NotFound(_) => "E_SHAPE_NOT_FOUND",
        }
    }
}

/// Locks to release and acquire when a selection changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionDiff {
    pub release: Vec<ShapeId>,
    pub acquire: Vec<ShapeId>,
}

/// Diff two selections. The caller owns both sets; nothing is remembered
/// between calls.
#[must_use]
pub fn selection_lock_diff(previous: &HashSet<ShapeId>, current: &HashSet<ShapeId>) -> SelectionDiff {
    let mut release: Vec<ShapeId> = previous.difference(current).copied().collect();
    let mut acquire: Vec<ShapeId> = current.difference(previous).copied().collect();
    release.sort_unstable();
    acquire.sort_unstable();
    SelectionDiff { release, acquire }
}

// =============================================================================
// LOCK MANAGER
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LockManager {
    ttl_ms: i64,
}

impl LockManager {
    #[must_use]
    pub fn new(ttl_ms: i64) -> Self {
        Self { ttl_ms }
    }

    #[must_use]
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Whether a lease granted at `locked_at` has outlived the TTL.
    #[must_use]
    pub fn is_expired(&self, locked_at: i64) -> bool {
        self.is_expired_at(locked_at, clock::now_ms())
    }

    #[must_use]
    pub fn is_expired_at(&self, locked_at: i64, now: i64) -> bool {
        now.saturating_sub(locked_at) > self.ttl_ms
    }

    /// The client holding a live lease on `shape`, ignoring expired ones.
    #[must_use]
    pub fn holder_at(&self, shape: &Shape, now: i64) -> Option<ClientId> {
        let holder = shape.locked_by?;
        // A holder without a grant time cannot be aged; treat it as lapsed.
        let locked_at = shape.locked_at?;
        (!self.is_expired_at(locked_at, now)).then_some(holder)
    }

    /// Whether `holder` may take the lease on `shape` at `now`.
    #[must_use]
    pub fn can_acquire_at(&self, shape: &Shape, holder: ClientId, now: i64) -> bool {
        match self.holder_at(shape, now) {
            None => true,
            Some(current) => current == holder,
        }
    }

    /// Take or renew the lease. On success the lease fields are written to
    /// the store and the returned patch should be persisted remotely.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Conflict`] while another holder's lease is live,
    /// and [`LockError::NotFound`] for an unknown shape. Never retries.
    pub fn acquire_at(
        &self,
        store: &mut ShapeStore,
        id: ShapeId,
        holder: ClientId,
        now: i64,
    ) -> Result<ShapePatch, LockError> {
        let shape = store.get(id).ok_or(LockError::NotFound(id))?;
        if let Some(current) = self.holder_at(shape, now)
            && current != holder
        {
            info!(shape_id = %id, %holder, %current, "lock conflict");
            return Err(LockError::Conflict { shape_id: id, holder: current });
        }
        if let Some(stale) = shape.locked_by
            && stale != holder
        {
            debug!(shape_id = %id, %holder, previous = %stale, "taking over expired lock");
        }
        let patch = ShapePatch::default().with_lock(Some(holder), Some(now));
        store.update(id, &patch);
        Ok(patch)
    }

    /// Release the lease if `holder` owns it. Returns `None` (a no-op) when
    /// someone else holds it, which protects a new holder from a stale
    /// release by a client that lost the lease to expiry.
    pub fn release(&self, store: &mut ShapeStore, id: ShapeId, holder: ClientId) -> Option<ShapePatch> {
        let shape = store.get(id)?;
        if shape.locked_by != Some(holder) {
            debug!(shape_id = %id, %holder, "ignored release from non-holder");
            return None;
        }
        let patch = ShapePatch::default().with_lock(None, None);
        store.update(id, &patch);
        Some(patch)
    }

    /// Shapes still carrying a lease that has lapsed.
    #[must_use]
    pub fn expired_locks_at(&self, store: &ShapeStore, now: i64) -> Vec<ShapeId> {
        store
            .get_all()
            .into_iter()
            .filter(|s| s.locked_by.is_some() && self.holder_at(s, now).is_none())
            .map(|s| s.id)
            .collect()
    }
}
