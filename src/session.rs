//! Session — one client's view of the shared canvas.
//!
//! DESIGN
//! ======
//! The session is the only mutation path for the UI layer. Every mutator
//! applies locally and synchronously, records into whatever history
//! transaction is open, stamps provenance with a monotonic client timestamp,
//! and returns the remote writes as a [`PendingWrites`] batch for the caller
//! to send. Local state is never rolled back when a send fails; the next
//! snapshot from the stream reconciles it.
//!
//! Edits to a shape whose lease is held by another live client are refused
//! with [`SessionError::LockConflict`] before anything is touched. That
//! includes undo and redo: a step that would rewrite a leased shape stays on
//! its stack until the lease is released or lapses.
//!
//! Mutations outside a history bracket are not undoable. The exceptions are
//! the bulk operations (`reorder`, `align`, `distribute`, `clear_shapes`),
//! which open their own entry when nothing else is recording.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::HashSet;
use std::future::Future;
use std::mem;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::ErrorCode;
use crate::history::{ActionType, HistoryEntry, HistoryError, HistoryManager, Snapshot, Transaction};
use crate::layout::{self, Alignment, Axis};
use crate::lock::{self, LockError, LockManager};
use crate::reconcile::Reconciler;
use crate::remote::{ChangeKind, PendingWrites, RemoteError, RemoteStore, WriteFailure};
use crate::shape::{ClientId, Geometry, Shape, ShapeId, ShapePatch, Stamp};
use crate::store::{ApplyOutcome, ShapeChange, ShapeStore, StoreError};
use crate::sync::{SyncDelta, SyncHandle, SyncService};
use crate::zorder::{self, ZOrderOp};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("shape {shape_id} is locked by {holder}")]
    LockConflict { shape_id: ShapeId, holder: ClientId },
    #[error("shape not found: {0}")]
    ShapeNotFound(ShapeId),
    #[error("shape already exists: {0}")]
    DuplicateShape(ShapeId),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("remote write failed: {0}")]
    Network(#[from] WriteFailure),
    #[error("initial load failed: {0}")]
    Load(#[source] RemoteError),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LockConflict { .. } => "E_LOCK_CONFLICT",
            Self::ShapeNotFound(_) => "E_SHAPE_NOT_FOUND",
            Self::DuplicateShape(_) => "E_DUPLICATE_SHAPE",
            Self::History(e) => e.error_code(),
            Self::Network(_) => "E_NETWORK",
            Self::Load(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Network(f) => f.source.retryable(),
            Self::Load(e) => e.retryable(),
            _ => false,
        }
    }
}

impl From<LockError> for SessionError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Conflict { shape_id, holder } => Self::LockConflict { shape_id, holder },
            LockError::NotFound(id) => Self::ShapeNotFound(id),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId(id) => Self::DuplicateShape(id),
        }
    }
}

/// Result of a selection change: lock writes plus the shapes whose lease
/// someone else holds.
#[derive(Debug)]
pub struct SelectionOutcome {
    pub writes: PendingWrites,
    pub refused: Vec<(ShapeId, ClientId)>,
}

/// Tally of one delta folded into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub stale: usize,
    pub missed: usize,
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    client_id: ClientId,
    store: ShapeStore,
    history: HistoryManager,
    locks: LockManager,
    reconciler: Reconciler,
    sync: SyncService,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    last_stamp: i64,
    /// Scratch transaction while a coalesced closure runs.
    coalescing: Option<Transaction>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("shapes", &self.store.len())
            .field("undo", &self.history.undo_len())
            .field("redo", &self.history.redo_len())
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(client_id: ClientId, remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self::with_clock(client_id, remote, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        client_id: ClientId,
        remote: Arc<dyn RemoteStore>,
        config: &SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client_id,
            store: ShapeStore::new(),
            history: HistoryManager::new(config.history_limit, config.coalesce_window_ms),
            locks: LockManager::new(config.lock_ttl_ms),
            reconciler: Reconciler::new(config.reconcile_grace_ms),
            sync: SyncService::new(config.frame_interval()),
            remote,
            clock,
            last_stamp: 0,
            coalescing: None,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    #[must_use]
    pub fn store(&self) -> &ShapeStore {
        &self.store
    }

    #[must_use]
    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.store.get(id)
    }

    /// Shapes in draw order.
    #[must_use]
    pub fn shapes(&self) -> Vec<&Shape> {
        self.store.get_all()
    }

    #[must_use]
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Provenance for the next write. Strictly increasing per session even if
    /// the wall clock stalls or steps back.
    fn next_stamp(&mut self) -> Stamp {
        let at = self.now().max(self.last_stamp.saturating_add(1));
        self.last_stamp = at;
        Stamp { by: self.client_id, at }
    }

    fn writes(&self, changes: Vec<ShapeChange>) -> PendingWrites {
        PendingWrites::new(Arc::clone(&self.remote), changes)
    }

    fn no_writes(&self) -> PendingWrites {
        PendingWrites::empty(Arc::clone(&self.remote))
    }

    /// Record into the coalescing scratch if one is active, else into the
    /// open explicit transaction, else nowhere.
    fn record(&mut self, id: ShapeId, before: Option<Snapshot>, after: Option<Snapshot>) {
        if let Some(tx) = self.coalescing.as_mut() {
            tx.record(id, before, after);
        } else if let Some(tx) = self.history.open_transaction() {
            tx.record(id, before, after);
        }
    }

    fn is_recording(&self) -> bool {
        self.coalescing.is_some() || self.history.is_recording()
    }

    /// Run `f` inside its own history entry unless something is already
    /// recording, in which case `f` joins it.
    fn recorded<R>(&mut self, action: ActionType, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.is_recording() {
            return f(self);
        }
        self.history.flush_due(self.now());
        if let Err(e) = self.history.begin(action) {
            debug!(error = %e, "history bracket unavailable");
            return f(self);
        }
        let out = f(self);
        if let Err(e) = self.history.commit() {
            debug!(error = %e, "history commit skipped");
        }
        out
    }

    /// Refuse when another client holds a live lease on `id`.
    fn check_lock(&self, id: ShapeId) -> Result<(), SessionError> {
        if let Some(shape) = self.store.get(id)
            && let Some(holder) = self.locks.holder_at(shape, self.now())
            && holder != self.client_id
        {
            info!(shape_id = %id, %holder, client = %self.client_id, "edit refused: shape locked");
            return Err(SessionError::LockConflict { shape_id: id, holder });
        }
        Ok(())
    }

    /// Refuse a history step that would touch a shape another client holds.
    fn check_entry_locks(&self, entry: Option<&HistoryEntry>) -> Result<(), SessionError> {
        entry.map_or(Ok(()), |e| e.changes.keys().try_for_each(|id| self.check_lock(*id)))
    }

    /// Apply the content fields of `patch` with `stamp` and record the delta.
    fn apply_update(&mut self, id: ShapeId, patch: &ShapePatch, stamp: Stamp) -> Option<ShapeChange> {
        let content = patch.content();
        if content.is_empty() {
            return None;
        }
        let Some(current) = self.store.get(id) else {
            debug!(shape_id = %id, "update missed unknown shape");
            return None;
        };
        let before = current.capture(&content);
        let stamped = content.clone().stamped(stamp);
        self.store.update(id, &stamped);
        self.record(id, Some(Snapshot::Fields(before)), Some(Snapshot::Fields(content)));
        Some(ShapeChange::Update { id, patch: stamped })
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Create a shape above everything else.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateShape`] on an id collision.
    pub fn create_shape(
        &mut self,
        geometry: Geometry,
        color: impl Into<String>,
    ) -> Result<(ShapeId, PendingWrites), SessionError> {
        let stamp = self.next_stamp();
        let shape = Shape::new(geometry, color, self.store.next_z_index(), stamp);
        let id = shape.id;
        info!(shape_id = %id, kind = shape.geometry.kind_name(), "shape created");
        let writes = self.insert_shape(shape)?;
        Ok((id, writes))
    }

    /// Insert a fully built shape, as a programmatic caller would.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateShape`] if the id already exists.
    pub fn insert_shape(&mut self, shape: Shape) -> Result<PendingWrites, SessionError> {
        self.store.create(shape.clone())?;
        self.record(shape.id, None, Some(Snapshot::shape(shape.clone())));
        Ok(self.writes(vec![ShapeChange::Create(shape)]))
    }

    /// Apply a partial update. Unknown ids are a no-op with no writes.
    /// Provenance and lease fields in `patch` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if another client holds the shape.
    pub fn update_shape(&mut self, id: ShapeId, patch: &ShapePatch) -> Result<PendingWrites, SessionError> {
        self.check_lock(id)?;
        let stamp = self.next_stamp();
        let changes: Vec<ShapeChange> = self.apply_update(id, patch, stamp).into_iter().collect();
        Ok(self.writes(changes))
    }

    /// Apply several updates under one timestamp. Locks are checked for every
    /// shape before any is touched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] for the first locked shape.
    pub fn update_multiple_shapes(&mut self, updates: &[(ShapeId, ShapePatch)]) -> Result<PendingWrites, SessionError> {
        for (id, _) in updates {
            self.check_lock(*id)?;
        }
        let stamp = self.next_stamp();
        let changes: Vec<ShapeChange> = updates
            .iter()
            .filter_map(|(id, patch)| self.apply_update(*id, patch, stamp))
            .collect();
        Ok(self.writes(changes))
    }

    /// Delete a shape. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if another client holds the shape.
    pub fn remove_shape(&mut self, id: ShapeId) -> Result<PendingWrites, SessionError> {
        self.check_lock(id)?;
        let Some(removed) = self.store.remove(id) else {
            return Ok(self.no_writes());
        };
        info!(shape_id = %id, "shape removed");
        self.record(id, Some(Snapshot::shape(removed)), None);
        Ok(self.writes(vec![ShapeChange::Remove(id)]))
    }

    /// Delete every shape as one undoable step.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if any shape is held by another
    /// client; nothing is removed in that case.
    pub fn clear_shapes(&mut self) -> Result<PendingWrites, SessionError> {
        let ids: Vec<ShapeId> = self.store.get_all().iter().map(|s| s.id).collect();
        for id in &ids {
            self.check_lock(*id)?;
        }
        Ok(self.recorded(ActionType::Clear, |session| {
            let removed = session.store.clear();
            info!(count = removed.len(), "canvas cleared");
            let mut changes = Vec::with_capacity(removed.len());
            for shape in removed {
                let id = shape.id;
                session.record(id, Some(Snapshot::shape(shape)), None);
                changes.push(ShapeChange::Remove(id));
            }
            session.writes(changes)
        }))
    }

    /// Restack `ids` and renormalize every z-index to `0..N`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if any selected shape is held by
    /// another client.
    pub fn reorder(&mut self, ids: &[ShapeId], op: ZOrderOp) -> Result<PendingWrites, SessionError> {
        for id in ids {
            self.check_lock(*id)?;
        }
        let selected: HashSet<ShapeId> = ids.iter().copied().collect();
        let moves = zorder::reorder(&self.store, &selected, op);
        if moves.is_empty() {
            return Ok(self.no_writes());
        }
        Ok(self.recorded(ActionType::Reorder, |session| {
            let stamp = session.next_stamp();
            let changes: Vec<ShapeChange> = moves
                .iter()
                .filter_map(|m| session.apply_update(m.id, &ShapePatch::default().with_z_index(m.after), stamp))
                .collect();
            session.writes(changes)
        }))
    }

    /// Align the given shapes. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if any shape is held by another client.
    pub fn align(&mut self, ids: &[ShapeId], alignment: Alignment) -> Result<PendingWrites, SessionError> {
        let patches = {
            let shapes = self.existing(ids)?;
            layout::align(&shapes, alignment)
        };
        Ok(self.apply_layout(ActionType::Align, &patches))
    }

    /// Space the given shapes evenly. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] if any shape is held by another client.
    pub fn distribute(&mut self, ids: &[ShapeId], axis: Axis) -> Result<PendingWrites, SessionError> {
        let patches = {
            let shapes = self.existing(ids)?;
            layout::distribute(&shapes, axis)
        };
        Ok(self.apply_layout(ActionType::Distribute, &patches))
    }

    fn existing(&self, ids: &[ShapeId]) -> Result<Vec<&Shape>, SessionError> {
        let mut shapes = Vec::with_capacity(ids.len());
        for id in ids {
            self.check_lock(*id)?;
            if let Some(shape) = self.store.get(*id) {
                shapes.push(shape);
            }
        }
        Ok(shapes)
    }

    fn apply_layout(&mut self, action: ActionType, patches: &[(ShapeId, ShapePatch)]) -> PendingWrites {
        if patches.is_empty() {
            return self.no_writes();
        }
        self.recorded(action, |session| {
            let stamp = session.next_stamp();
            let changes: Vec<ShapeChange> = patches
                .iter()
                .filter_map(|(id, patch)| session.apply_update(*id, patch, stamp))
                .collect();
            session.writes(changes)
        })
    }

    // -------------------------------------------------------------------------
    // Locks
    // -------------------------------------------------------------------------

    /// Take or renew this client's lease on `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockConflict`] while another client's lease is
    /// live and [`SessionError::ShapeNotFound`] for unknown ids. The caller
    /// must abort the gesture; nothing retries.
    pub fn acquire_lock(&mut self, id: ShapeId) -> Result<PendingWrites, SessionError> {
        let now = self.now();
        let patch = self.locks.acquire_at(&mut self.store, id, self.client_id, now)?;
        Ok(self.writes(vec![ShapeChange::Update { id, patch }]))
    }

    /// Release this client's lease on `id`; a no-op unless it holds one.
    pub fn release_lock(&mut self, id: ShapeId) -> PendingWrites {
        match self.locks.release(&mut self.store, id, self.client_id) {
            Some(patch) => self.writes(vec![ShapeChange::Update { id, patch }]),
            None => self.no_writes(),
        }
    }

    /// Release leases on shapes that left the selection and acquire leases on
    /// shapes that joined it. The caller owns both selections.
    pub fn update_selection(&mut self, previous: &HashSet<ShapeId>, current: &HashSet<ShapeId>) -> SelectionOutcome {
        let diff = lock::selection_lock_diff(previous, current);
        let mut writes = self.no_writes();
        for id in diff.release {
            writes.extend(self.release_lock(id));
        }
        let mut refused = Vec::new();
        for id in diff.acquire {
            match self.acquire_lock(id) {
                Ok(w) => writes.extend(w),
                Err(SessionError::LockConflict { shape_id, holder }) => refused.push((shape_id, holder)),
                Err(e) => debug!(shape_id = %id, error = %e, "selection lock skipped"),
            }
        }
        SelectionOutcome { writes, refused }
    }

    #[must_use]
    pub fn lock_holder(&self, id: ShapeId) -> Option<ClientId> {
        self.store.get(id).and_then(|s| self.locks.holder_at(s, self.now()))
    }

    /// Shapes whose lease has lapsed without a release.
    #[must_use]
    pub fn expired_locks(&self) -> Vec<ShapeId> {
        self.locks.expired_locks_at(&self.store, self.now())
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Open an explicit history bracket.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::AlreadyRecording`] if one is open.
    pub fn history_begin(&mut self, action: ActionType) -> Result<(), SessionError> {
        self.history.flush_due(self.now());
        Ok(self.history.begin(action)?)
    }

    /// Record a delta by hand into the open bracket.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotRecording`] outside a bracket.
    pub fn history_record(
        &mut self,
        id: ShapeId,
        before: Option<Snapshot>,
        after: Option<Snapshot>,
    ) -> Result<(), SessionError> {
        Ok(self.history.record(id, before, after)?)
    }

    /// Close the bracket. Returns whether an entry was pushed.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotRecording`] outside a bracket.
    pub fn history_commit(&mut self) -> Result<bool, SessionError> {
        Ok(self.history.commit()?)
    }

    pub fn history_cancel(&mut self) -> bool {
        self.history.cancel()
    }

    /// Run `f` with its mutations folded into the coalescing transaction for
    /// `key`, using the configured window.
    pub fn history_coalesce<R>(&mut self, key: &str, action: ActionType, f: impl FnOnce(&mut Self) -> R) -> R {
        let window = self.history.window_ms();
        self.history_coalesce_within(key, action, window, f)
    }

    /// [`Session::history_coalesce`] with an explicit window.
    pub fn history_coalesce_within<R>(
        &mut self,
        key: &str,
        action: ActionType,
        window_ms: i64,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let now = self.now();
        let outer = self.coalescing.replace(Transaction::new(action));
        let out = f(self);
        let scratch = mem::replace(&mut self.coalescing, outer).unwrap_or_else(|| Transaction::new(action));
        self.history.absorb_at(key, scratch, now, window_ms);
        out
    }

    /// Run `f` inside one explicit bracket. Whatever `f` changed is committed
    /// even when it fails part way, so it can still be undone.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::AlreadyRecording`] if a bracket is open, or the
    /// error `f` returned.
    pub fn transact<R>(
        &mut self,
        action: ActionType,
        f: impl FnOnce(&mut Self) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        self.history_begin(action)?;
        let out = f(self);
        self.history.commit()?;
        out
    }

    /// Undo the newest entry. Open coalescing windows are committed first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TransactionOpen`] inside an explicit bracket and
    /// [`SessionError::LockConflict`] when the entry touches a shape another
    /// client holds; the entry then stays on the undo stack.
    pub fn undo(&mut self) -> Result<PendingWrites, SessionError> {
        if self.history.is_recording() {
            return Err(HistoryError::TransactionOpen.into());
        }
        self.history.flush_all();
        self.check_entry_locks(self.history.last())?;
        let stamp = self.next_stamp();
        match self.history.undo(&mut self.store, stamp)? {
            Some(changes) => Ok(self.writes(changes)),
            None => Ok(self.no_writes()),
        }
    }

    /// Redo the newest undone entry.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TransactionOpen`] inside an explicit bracket and
    /// [`SessionError::LockConflict`] when the entry touches a shape another
    /// client holds.
    pub fn redo(&mut self) -> Result<PendingWrites, SessionError> {
        if self.history.is_recording() {
            return Err(HistoryError::TransactionOpen.into());
        }
        self.history.flush_all();
        self.check_entry_locks(self.history.next_redo())?;
        let stamp = self.next_stamp();
        match self.history.redo(&mut self.store, stamp)? {
            Some(changes) => Ok(self.writes(changes)),
            None => Ok(self.no_writes()),
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Commit coalescing windows that have gone quiet. Call once per UI tick.
    pub fn flush_history(&mut self) -> usize {
        self.history.flush_due(self.now())
    }

    // -------------------------------------------------------------------------
    // Load and sync
    // -------------------------------------------------------------------------

    /// Start the bulk fetch. The future does not borrow the session, so local
    /// edits can continue while it is in flight.
    pub fn fetch_initial(&self) -> impl Future<Output = Result<Vec<Shape>, RemoteError>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        async move { remote.fetch_all().await }
    }

    /// Merge a resolved bulk fetch with whatever was created locally in the
    /// meantime. Returns the fetched count for the first-snapshot check.
    pub fn complete_initial_load(&mut self, fetched: Vec<Shape>) -> usize {
        let count = fetched.len();
        let local = self.store.snapshot();
        let now = self.now();
        let merged = self.reconciler.merge_initial_load_at(fetched, local, now);
        self.store.replace_all(merged);
        info!(fetched = count, total = self.store.len(), "initial load merged");
        count
    }

    /// Fetch and merge in one step.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Load`] if the fetch fails.
    pub async fn load(&mut self) -> Result<usize, SessionError> {
        let fetched = self.fetch_initial().await.map_err(SessionError::Load)?;
        Ok(self.complete_initial_load(fetched))
    }

    /// Subscribe to the remote stream. Deltas are handed to `on_changes`; the
    /// owner of the session folds them in with [`Session::apply_remote`].
    pub fn subscribe<F>(&self, initial_count: Option<usize>, on_changes: F) -> SyncHandle
    where
        F: FnMut(SyncDelta) + Send + 'static,
    {
        self.sync.subscribe(self.remote.as_ref(), initial_count, on_changes)
    }

    /// Load, then subscribe with the fetched count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Load`] if the fetch fails.
    pub async fn connect<F>(&mut self, on_changes: F) -> Result<SyncHandle, SessionError>
    where
        F: FnMut(SyncDelta) + Send + 'static,
    {
        let count = self.load().await?;
        Ok(self.subscribe(Some(count), on_changes))
    }

    /// Fold a delivered delta into the store with last-write-wins.
    pub fn apply_remote(&mut self, delta: &SyncDelta) -> ApplyReport {
        let mut report = ApplyReport::default();
        let batches = [
            (ChangeKind::Added, &delta.added),
            (ChangeKind::Modified, &delta.modified),
            (ChangeKind::Removed, &delta.removed),
        ];
        for (kind, shapes) in batches {
            for shape in shapes {
                self.reconciler.confirm(shape.id);
                match self.store.apply_remote(kind, shape) {
                    ApplyOutcome::Inserted | ApplyOutcome::Replaced | ApplyOutcome::Removed => report.applied += 1,
                    ApplyOutcome::Stale => report.stale += 1,
                    ApplyOutcome::Miss => report.missed += 1,
                }
            }
        }
        let unconfirmed = self.reconciler.sweep_at(self.now());
        if !unconfirmed.is_empty() {
            warn!(count = unconfirmed.len(), "optimistic shapes left unconfirmed");
        }
        debug!(applied = report.applied, stale = report.stale, missed = report.missed, "remote delta applied");
        report
    }
}
