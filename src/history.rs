//! History manager — transactional undo/redo with time-windowed coalescing.
//!
//! DESIGN
//! ======
//! A [`Transaction`] accumulates one `{before, after}` delta per shape. An
//! explicit `begin`/`record`/`commit` bracket produces one [`HistoryEntry`];
//! coalescing keeps one transaction open per key and commits it only after
//! the key has been quiet for its window, so a burst of nudges undoes as one
//! step.
//!
//! Undo applies every `before`, redo every `after`. A `None` side means the
//! shape did not exist on that side, so undoing a create removes the shape
//! and undoing a delete recreates it. Replayed changes are stamped with the
//! caller's provenance so they win last-write-wins on every other client.
//!
//! Only one coalescing transaction may be open per key. Opening or extending
//! a key whose shapes overlap another open key commits the other key first;
//! keys over disjoint shapes proceed independently.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorCode;
use crate::shape::{Shape, ShapeId, ShapePatch, Stamp};
use crate::store::{ShapeChange, ShapeStore};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("a history transaction is already open")]
    AlreadyRecording,
    #[error("no history transaction is open")]
    NotRecording,
    #[error("cannot undo or redo while a history transaction is open")]
    TransactionOpen,
}

impl ErrorCode for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRecording => "E_HISTORY_ALREADY_RECORDING",
            Self::NotRecording => "E_HISTORY_NOT_RECORDING",
            Self::TransactionOpen => "E_HISTORY_TRANSACTION_OPEN",
        }
    }
}

/// What kind of user action an entry undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Delete,
    Move,
    Resize,
    Rotate,
    ColorChange,
    TextUpdate,
    Align,
    Distribute,
    Reorder,
    Clear,
    Batch,
}

/// One side of a shape delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Snapshot {
    /// The whole shape, for sides where it must be recreated.
    Shape(Box<Shape>),
    /// Just the fields an edit touched.
    Fields(ShapePatch),
}

impl Snapshot {
    #[must_use]
    pub fn shape(shape: Shape) -> Self {
        Self::Shape(Box::new(shape))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDelta {
    /// State before the action; `None` if the shape did not exist.
    pub before: Option<Snapshot>,
    /// State after the action; `None` if the shape was removed.
    pub after: Option<Snapshot>,
}

/// A committed, undoable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ActionType,
    pub changes: BTreeMap<ShapeId, ShapeDelta>,
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// An entry under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    action: ActionType,
    changes: BTreeMap<ShapeId, ShapeDelta>,
}

impl Transaction {
    #[must_use]
    pub fn new(action: ActionType) -> Self {
        Self { action, changes: BTreeMap::new() }
    }

    #[must_use]
    pub fn action(&self) -> ActionType {
        self.action
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn delta(&self, id: ShapeId) -> Option<&ShapeDelta> {
        self.changes.get(&id)
    }

    #[must_use]
    pub fn shape_ids(&self) -> BTreeSet<ShapeId> {
        self.changes.keys().copied().collect()
    }

    fn touches_any(&self, ids: &BTreeSet<ShapeId>) -> bool {
        ids.iter().any(|id| self.changes.contains_key(id))
    }

    /// Accumulate one shape's delta. Repeated calls for the same id keep the
    /// earliest `before` and let the latest `after` win. A shape created and
    /// removed inside one transaction drops out entirely.
    pub fn record(&mut self, id: ShapeId, before: Option<Snapshot>, after: Option<Snapshot>) {
        match self.changes.entry(id) {
            Entry::Vacant(slot) => {
                if before.is_some() || after.is_some() {
                    slot.insert(ShapeDelta { before, after });
                }
            }
            Entry::Occupied(mut slot) => {
                let delta = slot.get_mut();
                delta.before = merge_before(delta.before.take(), before);
                delta.after = merge_after(delta.after.take(), after);
                if delta.before.is_none() && delta.after.is_none() {
                    slot.remove();
                }
            }
        }
    }

    /// Fold a later transaction into this one, shape by shape.
    pub fn merge(&mut self, later: Transaction) {
        for (id, delta) in later.changes {
            self.record(id, delta.before, delta.after);
        }
    }

    fn into_entry(self) -> HistoryEntry {
        HistoryEntry { action: self.action, changes: self.changes }
    }
}

fn merge_before(first: Option<Snapshot>, later: Option<Snapshot>) -> Option<Snapshot> {
    match (first, later) {
        (Some(Snapshot::Fields(mut earlier)), Some(Snapshot::Fields(more))) => {
            earlier.fill_missing(&more);
            Some(Snapshot::Fields(earlier))
        }
        // The later full shape already carries the earlier edits; roll them back.
        (Some(Snapshot::Fields(earlier)), Some(Snapshot::Shape(mut shape))) => {
            shape.apply(&earlier);
            Some(Snapshot::Shape(shape))
        }
        (first, _) => first,
    }
}

fn merge_after(first: Option<Snapshot>, later: Option<Snapshot>) -> Option<Snapshot> {
    match (first, later) {
        (Some(Snapshot::Fields(mut earlier)), Some(Snapshot::Fields(latest))) => {
            earlier.overlay(&latest);
            Some(Snapshot::Fields(earlier))
        }
        (Some(Snapshot::Shape(mut shape)), Some(Snapshot::Fields(latest))) => {
            shape.apply(&latest);
            Some(Snapshot::Shape(shape))
        }
        (_, later) => later,
    }
}

// =============================================================================
// HISTORY MANAGER
// =============================================================================

#[derive(Debug, Clone)]
struct Coalescing {
    tx: Transaction,
    deadline: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Undo/redo stacks plus the open explicit and coalescing transactions.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
    window_ms: i64,
    open: Option<Transaction>,
    coalescing: HashMap<String, Coalescing>,
}

impl HistoryManager {
    #[must_use]
    pub fn new(limit: usize, window_ms: i64) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit,
            window_ms,
            open: None,
            coalescing: HashMap::new(),
        }
    }

    #[must_use]
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    // -------------------------------------------------------------------------
    // Explicit brackets
    // -------------------------------------------------------------------------

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::AlreadyRecording`] if one is already open.
    pub fn begin(&mut self, action: ActionType) -> Result<(), HistoryError> {
        if self.open.is_some() {
            return Err(HistoryError::AlreadyRecording);
        }
        self.open = Some(Transaction::new(action));
        Ok(())
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.open.is_some()
    }

    /// The open explicit transaction, for callers that record into it.
    pub fn open_transaction(&mut self) -> Option<&mut Transaction> {
        self.open.as_mut()
    }

    /// Record into the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotRecording`] outside a `begin`/`commit` bracket.
    pub fn record(
        &mut self,
        id: ShapeId,
        before: Option<Snapshot>,
        after: Option<Snapshot>,
    ) -> Result<(), HistoryError> {
        let tx = self.open.as_mut().ok_or(HistoryError::NotRecording)?;
        tx.record(id, before, after);
        Ok(())
    }

    /// Close the open transaction and push it. Returns whether an entry was
    /// pushed; an empty transaction records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotRecording`] if nothing is open.
    pub fn commit(&mut self) -> Result<bool, HistoryError> {
        let tx = self.open.take().ok_or(HistoryError::NotRecording)?;
        Ok(self.push(tx))
    }

    /// Drop the open transaction without recording it. The store is not
    /// touched; callers that already mutated must revert themselves.
    pub fn cancel(&mut self) -> bool {
        self.open.take().is_some()
    }

    // -------------------------------------------------------------------------
    // Coalescing
    // -------------------------------------------------------------------------

    /// Run `f` against a scratch transaction and fold the result into the
    /// coalescing transaction for `key`, extending its window.
    pub fn coalesce_at<R>(
        &mut self,
        key: &str,
        action: ActionType,
        now: i64,
        f: impl FnOnce(&mut Transaction) -> R,
    ) -> R {
        let mut scratch = Transaction::new(action);
        let out = f(&mut scratch);
        self.absorb_at(key, scratch, now, self.window_ms);
        out
    }

    /// Fold an already-recorded scratch transaction into `key`'s coalescing
    /// transaction, with an explicit window.
    pub fn absorb_at(&mut self, key: &str, scratch: Transaction, now: i64, window_ms: i64) {
        self.flush_due(now);

        let ids = scratch.shape_ids();
        let mut conflicting: Vec<String> = self
            .coalescing
            .iter()
            .filter(|(k, open)| k.as_str() != key && open.tx.touches_any(&ids))
            .map(|(k, _)| k.clone())
            .collect();
        conflicting.sort();
        for other in conflicting {
            if let Some(open) = self.coalescing.remove(&other) {
                debug!(key = %other, by = %key, "closing overlapping coalesced transaction");
                self.push(open.tx);
            }
        }

        let deadline = now.saturating_add(window_ms);
        let open = self
            .coalescing
            .entry(key.to_owned())
            .or_insert_with(|| Coalescing { tx: Transaction::new(scratch.action), deadline });
        open.tx.merge(scratch);
        open.deadline = deadline;
    }

    /// Commit coalescing transactions whose window has elapsed. Returns how
    /// many entries were pushed.
    pub fn flush_due(&mut self, now: i64) -> usize {
        let mut due: Vec<(i64, String)> = self
            .coalescing
            .iter()
            .filter(|(_, open)| now >= open.deadline)
            .map(|(k, open)| (open.deadline, k.clone()))
            .collect();
        due.sort();
        self.commit_keys(due.into_iter().map(|(_, k)| k))
    }

    /// Commit every coalescing transaction regardless of its window.
    pub fn flush_all(&mut self) -> usize {
        let mut keys: Vec<(i64, String)> = self.coalescing.iter().map(|(k, open)| (open.deadline, k.clone())).collect();
        keys.sort();
        self.commit_keys(keys.into_iter().map(|(_, k)| k))
    }

    fn commit_keys(&mut self, keys: impl Iterator<Item = String>) -> usize {
        let mut pushed = 0;
        for key in keys {
            if let Some(open) = self.coalescing.remove(&key)
                && self.push(open.tx)
            {
                pushed += 1;
            }
        }
        pushed
    }

    #[must_use]
    pub fn is_coalescing(&self, key: &str) -> bool {
        self.coalescing.contains_key(key)
    }

    // -------------------------------------------------------------------------
    // Undo / redo
    // -------------------------------------------------------------------------

    /// Revert the newest entry. Returns the store changes made (to persist
    /// remotely), or `None` when there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TransactionOpen`] inside a `begin` bracket.
    pub fn undo(&mut self, store: &mut ShapeStore, stamp: Stamp) -> Result<Option<Vec<ShapeChange>>, HistoryError> {
        self.flush_all();
        if self.open.is_some() {
            return Err(HistoryError::TransactionOpen);
        }
        let Some(entry) = self.undo.pop() else {
            return Ok(None);
        };
        let changes = replay(store, &entry, Side::Before, stamp);
        debug!(action = ?entry.action, shapes = entry.changes.len(), "undo");
        self.redo.push(entry);
        Ok(Some(changes))
    }

    /// Reapply the newest undone entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TransactionOpen`] inside a `begin` bracket.
    pub fn redo(&mut self, store: &mut ShapeStore, stamp: Stamp) -> Result<Option<Vec<ShapeChange>>, HistoryError> {
        self.flush_all();
        if self.open.is_some() {
            return Err(HistoryError::TransactionOpen);
        }
        let Some(entry) = self.redo.pop() else {
            return Ok(None);
        };
        let changes = replay(store, &entry, Side::After, stamp);
        debug!(action = ?entry.action, shapes = entry.changes.len(), "redo");
        self.undo.push(entry);
        Ok(Some(changes))
    }

    /// Whether an entry is available to undo, counting coalescing
    /// transactions that undo would commit first.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty() || self.coalescing.values().any(|open| !open.tx.is_empty())
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Newest committed entry.
    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.undo.last()
    }

    /// Newest undone entry, the one `redo` would reapply.
    #[must_use]
    pub fn next_redo(&self) -> Option<&HistoryEntry> {
        self.redo.last()
    }

    /// Forget everything, including open transactions.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.open = None;
        self.coalescing.clear();
    }

    fn push(&mut self, tx: Transaction) -> bool {
        if tx.is_empty() {
            return false;
        }
        let entry = tx.into_entry();
        debug!(action = ?entry.action, shapes = entry.changes.len(), "history commit");
        self.undo.push(entry);
        self.redo.clear();
        if self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
        true
    }
}

/// Drive the store to one side of `entry`.
fn replay(store: &mut ShapeStore, entry: &HistoryEntry, side: Side, stamp: Stamp) -> Vec<ShapeChange> {
    let mut out = Vec::with_capacity(entry.changes.len());
    for (id, delta) in &entry.changes {
        let target = match side {
            Side::Before => &delta.before,
            Side::After => &delta.after,
        };
        match target {
            None => {
                if store.remove(*id).is_some() {
                    out.push(ShapeChange::Remove(*id));
                }
            }
            Some(Snapshot::Shape(shape)) => {
                let mut restored = (**shape).clone();
                restored.last_modified_by = stamp.by;
                restored.last_modified_at = stamp.at;
                restored.locked_by = None;
                restored.locked_at = None;
                store.upsert(restored.clone());
                out.push(ShapeChange::Create(restored));
            }
            Some(Snapshot::Fields(fields)) => {
                let patch = fields.clone().stamped(stamp);
                if store.update(*id, &patch) {
                    out.push(ShapeChange::Update { id: *id, patch });
                } else {
                    debug!(shape_id = %id, "history replay skipped missing shape");
                }
            }
        }
    }
    out
}
