//! Reconciliation — merging the initial bulk load with optimistic local state.
//!
//! A client may draw shapes after it issued the bulk fetch but before the
//! fetch resolved. Taking the fetched set as-is would silently delete them,
//! so local-only ids are appended to the fetched set. For ids present on both
//! sides the fetched copy wins.
//!
//! Ids kept that way are tracked until a stream event names them. One that
//! stays unconfirmed past the grace period is logged as a reconciliation
//! ambiguity and forgotten; the next snapshot settles it either way.

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::shape::{Shape, ShapeId};

/// Merge `fetched` with `local`: `F ∪ (L \ F)`, no duplicate ids. Fetched
/// order comes first, then local-only shapes in their given order.
#[must_use]
pub fn merge_initial_load(fetched: Vec<Shape>, local: Vec<Shape>) -> Vec<Shape> {
    merge(fetched, local).0
}

fn merge(fetched: Vec<Shape>, local: Vec<Shape>) -> (Vec<Shape>, Vec<ShapeId>) {
    let mut seen: HashSet<ShapeId> = HashSet::with_capacity(fetched.len() + local.len());
    let mut merged: Vec<Shape> = Vec::with_capacity(fetched.len() + local.len());
    for shape in fetched {
        if seen.insert(shape.id) {
            merged.push(shape);
        }
    }
    let mut kept = Vec::new();
    for shape in local {
        if seen.insert(shape.id) {
            kept.push(shape.id);
            merged.push(shape);
        }
    }
    (merged, kept)
}

/// Tracks optimistic-only shapes until the stream confirms them.
#[derive(Debug, Clone)]
pub struct Reconciler {
    grace_ms: i64,
    pending: HashMap<ShapeId, i64>,
}

impl Reconciler {
    #[must_use]
    pub fn new(grace_ms: i64) -> Self {
        Self { grace_ms, pending: HashMap::new() }
    }

    /// [`merge_initial_load`], remembering which local ids were kept.
    pub fn merge_initial_load_at(&mut self, fetched: Vec<Shape>, local: Vec<Shape>, now: i64) -> Vec<Shape> {
        let fetched_count = fetched.len();
        let (merged, kept) = merge(fetched, local);
        if !kept.is_empty() {
            debug!(fetched = fetched_count, kept = kept.len(), "kept optimistic shapes through initial load");
        }
        for id in kept {
            self.pending.insert(id, now);
        }
        merged
    }

    /// The stream named `id`; it no longer needs watching.
    pub fn confirm(&mut self, id: ShapeId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Forget ids left unconfirmed past the grace period. Returns them.
    pub fn sweep_at(&mut self, now: i64) -> Vec<ShapeId> {
        let mut stale: Vec<ShapeId> = self
            .pending
            .iter()
            .filter(|(_, kept_at)| now.saturating_sub(**kept_at) > self.grace_ms)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();
        for id in &stale {
            self.pending.remove(id);
            warn!(shape_id = %id, grace_ms = self.grace_ms, "reconciliation ambiguity: optimistic shape never confirmed");
        }
        stale
    }

    #[must_use]
    pub fn is_pending(&self, id: ShapeId) -> bool {
        self.pending.contains_key(&id)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
