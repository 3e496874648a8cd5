//! Shape store — the client's in-memory view of every shape.
//!
//! DESIGN
//! ======
//! All operations are synchronous over a `HashMap`. Persisting a change to
//! the remote store is the caller's job, which keeps local mutation latency
//! independent of the network (optimistic UI).
//!
//! Remote events go through [`ShapeStore::apply_remote`], which applies
//! last-write-wins on `last_modified_at`. A remote shape replaces the local
//! copy, except for fields this client wrote after the remote version was
//! made: those local writes are kept until an echo at least as new arrives.
//! With nothing pending, an older remote shape is dropped as stale.
//!
//! Removed shapes leave a tombstone so a late echo of an earlier write cannot
//! bring them back. Tombstones are capped; the oldest removals go first.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::DEFAULT_TOMBSTONE_LIMIT;
use crate::error::ErrorCode;
use crate::remote::ChangeKind;
use crate::shape::{Shape, ShapeId, ShapePatch};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("shape already exists: {0}")]
    DuplicateId(ShapeId),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "E_DUPLICATE_SHAPE",
        }
    }
}

/// One local mutation, also the unit of remote persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ShapeChange {
    Create(Shape),
    Update { id: ShapeId, patch: ShapePatch },
    Remove(ShapeId),
}

impl ShapeChange {
    #[must_use]
    pub fn shape_id(&self) -> ShapeId {
        match self {
            Self::Create(shape) => shape.id,
            Self::Update { id, .. } | Self::Remove(id) => *id,
        }
    }
}

/// Result of folding one remote event into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A shape the store did not hold was added.
    Inserted,
    /// An existing shape was overwritten by an equal-or-newer version.
    Replaced,
    /// The shape was deleted.
    Removed,
    /// The event was older than local state and was dropped.
    Stale,
    /// The event named a shape the store does not hold.
    Miss,
}

/// Summary of [`ShapeStore::apply_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    /// Ids whose change could not be applied (unknown id or duplicate create).
    pub missed: Vec<ShapeId>,
}

// =============================================================================
// STORE
// =============================================================================

/// A stamped local content write not yet covered by a remote echo.
#[derive(Debug, Clone)]
struct LocalWrite {
    at: i64,
    patch: ShapePatch,
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    /// `last_modified_at` of the shape when it was removed.
    at: i64,
    seq: u64,
}

/// In-memory store of shapes keyed by id.
#[derive(Debug, Clone)]
pub struct ShapeStore {
    shapes: HashMap<ShapeId, Shape>,
    unconfirmed: HashMap<ShapeId, Vec<LocalWrite>>,
    tombstones: HashMap<ShapeId, Tombstone>,
    /// Removal order, oldest first. May hold entries for ids recreated since.
    tombstone_order: VecDeque<(ShapeId, u64)>,
    tombstone_seq: u64,
    tombstone_limit: usize,
}

impl Default for ShapeStore {
    fn default() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }
}

impl ShapeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that remembers at most `limit` removals.
    #[must_use]
    pub fn with_tombstone_limit(limit: usize) -> Self {
        Self {
            shapes: HashMap::new(),
            unconfirmed: HashMap::new(),
            tombstones: HashMap::new(),
            tombstone_order: VecDeque::new(),
            tombstone_seq: 0,
            tombstone_limit: limit,
        }
    }

    /// Insert a new shape.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if the id is already present.
    pub fn create(&mut self, shape: Shape) -> Result<(), StoreError> {
        if self.shapes.contains_key(&shape.id) {
            return Err(StoreError::DuplicateId(shape.id));
        }
        self.tombstones.remove(&shape.id);
        self.shapes.insert(shape.id, shape);
        Ok(())
    }

    /// Insert or replace a shape regardless of timestamps. Used when a local
    /// action restores a whole shape (undoing a delete).
    pub fn upsert(&mut self, shape: Shape) {
        self.tombstones.remove(&shape.id);
        self.unconfirmed.remove(&shape.id);
        self.shapes.insert(shape.id, shape);
    }

    /// Apply a partial update. Returns `false` (a miss, not an error) when the
    /// id is unknown, since remote updates can race with local deletes.
    ///
    /// A patch carrying `last_modified_at` is a local write: its content
    /// fields survive remote versions older than it.
    pub fn update(&mut self, id: ShapeId, patch: &ShapePatch) -> bool {
        let Some(shape) = self.shapes.get_mut(&id) else {
            debug!(shape_id = %id, "update missed unknown shape");
            return false;
        };
        shape.apply(patch);
        if let Some(at) = patch.last_modified_at {
            let mut content = patch.content();
            if !content.is_empty() {
                content.last_modified_by = patch.last_modified_by;
                content.last_modified_at = Some(at);
                self.unconfirmed.entry(id).or_default().push(LocalWrite { at, patch: content });
            }
        }
        true
    }

    /// Remove a shape, leaving a tombstone.
    pub fn remove(&mut self, id: ShapeId) -> Option<Shape> {
        let removed = self.shapes.remove(&id)?;
        self.unconfirmed.remove(&id);
        self.bury(id, removed.last_modified_at);
        Some(removed)
    }

    /// Remove every shape, returning them in draw order.
    pub fn clear(&mut self) -> Vec<Shape> {
        let mut removed: Vec<Shape> = self.shapes.drain().map(|(_, s)| s).collect();
        removed.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        self.unconfirmed.clear();
        for shape in &removed {
            self.bury(shape.id, shape.last_modified_at);
        }
        removed
    }

    /// Apply a list of local changes in order.
    pub fn apply_batch(&mut self, changes: Vec<ShapeChange>) -> BatchReport {
        let mut report = BatchReport::default();
        for change in changes {
            let id = change.shape_id();
            let ok = match change {
                ShapeChange::Create(shape) => self.create(shape).is_ok(),
                ShapeChange::Update { id, patch } => self.update(id, &patch),
                ShapeChange::Remove(id) => self.remove(id).is_some(),
            };
            if ok {
                report.applied += 1;
            } else {
                report.missed.push(id);
            }
        }
        report
    }

    /// Fold one remote event into the store with last-write-wins.
    ///
    /// Applying the same event twice leaves the same state as applying it once.
    pub fn apply_remote(&mut self, kind: ChangeKind, incoming: &Shape) -> ApplyOutcome {
        let id = incoming.id;
        match kind {
            ChangeKind::Added | ChangeKind::Modified => {
                if let Some(tombstone) = self.tombstones.get(&id)
                    && incoming.last_modified_at <= tombstone.at
                {
                    debug!(shape_id = %id, incoming = incoming.last_modified_at, removed_at = tombstone.at, "dropped write to removed shape");
                    return ApplyOutcome::Stale;
                }
                match self.shapes.get_mut(&id) {
                    Some(current) => {
                        let mut pending = self.unconfirmed.remove(&id).unwrap_or_default();
                        pending.retain(|w| w.at > incoming.last_modified_at);
                        if pending.is_empty() && incoming.last_modified_at < current.last_modified_at {
                            debug!(
                                shape_id = %id,
                                incoming = incoming.last_modified_at,
                                current = current.last_modified_at,
                                "dropped stale remote write"
                            );
                            return ApplyOutcome::Stale;
                        }
                        current.clone_from(incoming);
                        for write in &pending {
                            current.apply(&write.patch);
                        }
                        if !pending.is_empty() {
                            debug!(shape_id = %id, kept = pending.len(), "kept newer local writes over remote version");
                            self.unconfirmed.insert(id, pending);
                        }
                        ApplyOutcome::Replaced
                    }
                    None if kind == ChangeKind::Added => {
                        self.tombstones.remove(&id);
                        self.shapes.insert(id, incoming.clone());
                        ApplyOutcome::Inserted
                    }
                    None => {
                        debug!(shape_id = %id, "remote modify missed unknown shape");
                        ApplyOutcome::Miss
                    }
                }
            }
            ChangeKind::Removed => match self.remove(id) {
                Some(_) => ApplyOutcome::Removed,
                None => ApplyOutcome::Miss,
            },
        }
    }

    /// Replace every shape with `shapes`. Tombstones are kept.
    pub fn replace_all(&mut self, shapes: Vec<Shape>) {
        self.shapes.clear();
        for shape in shapes {
            self.tombstones.remove(&shape.id);
            self.shapes.insert(shape.id, shape);
        }
        self.unconfirmed.retain(|id, _| self.shapes.contains_key(id));
    }

    fn bury(&mut self, id: ShapeId, at: i64) {
        self.tombstone_seq += 1;
        let seq = self.tombstone_seq;
        self.tombstones.insert(id, Tombstone { at, seq });
        self.tombstone_order.push_back((id, seq));
        while self.tombstones.len() > self.tombstone_limit {
            let Some((oldest, seq)) = self.tombstone_order.pop_front() else {
                break;
            };
            if self.tombstones.get(&oldest).is_some_and(|t| t.seq == seq) {
                self.tombstones.remove(&oldest);
            }
        }
        if self.tombstone_order.len() > self.tombstone_limit.saturating_mul(2) {
            let live = &self.tombstones;
            self.tombstone_order.retain(|(id, seq)| live.get(id).is_some_and(|t| t.seq == *seq));
        }
    }

    /// Return a reference to a shape by id.
    #[must_use]
    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.contains_key(&id)
    }

    /// All shapes sorted by `(z_index, id)` for draw order.
    #[must_use]
    pub fn get_all(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self.shapes.values().collect();
        shapes.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        shapes
    }

    /// Owned copy of [`ShapeStore::get_all`].
    #[must_use]
    pub fn snapshot(&self) -> Vec<Shape> {
        self.get_all().into_iter().cloned().collect()
    }

    /// z-index for a shape placed above everything else.
    #[must_use]
    pub fn next_z_index(&self) -> i64 {
        self.shapes.values().map(|s| s.z_index + 1).max().unwrap_or(0)
    }

    /// Whether `id` was removed and not recreated since.
    #[must_use]
    pub fn is_tombstoned(&self, id: ShapeId) -> bool {
        self.tombstones.contains_key(&id)
    }

    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Local writes to `id` that no remote version has caught up with yet.
    #[must_use]
    pub fn unconfirmed_writes(&self, id: ShapeId) -> usize {
        self.unconfirmed.get(&id).map_or(0, Vec::len)
    }

    /// Number of shapes currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns `true` if the store contains no shapes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
