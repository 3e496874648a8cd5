//! Remote shape store boundary.
//!
//! DESIGN
//! ======
//! The remote store is the shared collection every client writes to and
//! subscribes on. It sits behind the [`RemoteStore`] trait so the core never
//! depends on a transport. Writes are partial (`update_shape` sends only the
//! changed fields) and every change is echoed back to subscribers as a
//! [`ChangeEvent`] carrying the full shape.
//!
//! ERROR HANDLING
//! ==============
//! A failed write is reported, never rolled back locally. The next snapshot
//! from the stream reconciles whatever the server actually holds.

pub mod memory;

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::shape::{Shape, ShapeId, ShapePatch};
use crate::store::ShapeChange;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("shape not found on remote: {0}")]
    NotFound(ShapeId),
}

impl ErrorCode for RemoteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::NotFound(_) => "E_REMOTE_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// What happened to a shape on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One remote change. `shape` is the full shape after the change, or the
/// last known shape for `Removed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub shape: Shape,
}

impl ChangeEvent {
    #[must_use]
    pub fn added(shape: Shape) -> Self {
        Self { kind: ChangeKind::Added, shape }
    }

    #[must_use]
    pub fn modified(shape: Shape) -> Self {
        Self { kind: ChangeKind::Modified, shape }
    }

    #[must_use]
    pub fn removed(shape: Shape) -> Self {
        Self { kind: ChangeKind::Removed, shape }
    }
}

/// Live feed of snapshots (batches of change events) from the remote store.
/// Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
}

impl Subscription {
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>) -> Self {
        Self { rx }
    }

    /// Next snapshot, or `None` once the remote side closes the feed.
    pub async fn recv(&mut self) -> Option<Vec<ChangeEvent>> {
        self.rx.recv().await
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Persistence collaborator holding the shared shape collection.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persist a new shape (or overwrite one with the same id).
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Network`] if the store is unreachable.
    async fn create_shape(&self, shape: &Shape) -> Result<(), RemoteError>;

    /// Apply a partial update. Unchanged fields are not re-sent.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for unknown ids and
    /// [`RemoteError::Network`] if the store is unreachable.
    async fn update_shape(&self, id: ShapeId, patch: &ShapePatch) -> Result<(), RemoteError>;

    /// Delete a shape.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Network`] if the store is unreachable.
    async fn delete_shape(&self, id: ShapeId) -> Result<(), RemoteError>;

    /// Read every shape once.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Network`] if the store is unreachable.
    async fn fetch_all(&self) -> Result<Vec<Shape>, RemoteError>;

    /// Start receiving snapshots. The first snapshot lists every existing
    /// shape as `Added`.
    fn subscribe(&self) -> Subscription;
}

// =============================================================================
// PENDING WRITES
// =============================================================================

/// Remote writes produced by a local mutation that has already been applied
/// optimistically. The caller decides when to send them: await
/// [`PendingWrites::send`] directly, or spawn it to keep several in flight.
#[must_use = "pending writes do nothing until sent"]
pub struct PendingWrites {
    remote: Arc<dyn RemoteStore>,
    changes: Vec<ShapeChange>,
}

impl PendingWrites {
    pub fn new(remote: Arc<dyn RemoteStore>, changes: Vec<ShapeChange>) -> Self {
        Self { remote, changes }
    }

    pub fn empty(remote: Arc<dyn RemoteStore>) -> Self {
        Self::new(remote, Vec::new())
    }

    #[must_use]
    pub fn changes(&self) -> &[ShapeChange] {
        &self.changes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn push(&mut self, change: ShapeChange) {
        self.changes.push(change);
    }

    /// Append another batch's writes to this one.
    pub fn extend(&mut self, other: PendingWrites) {
        self.changes.extend(other.changes);
    }

    /// Issue every write concurrently. Arrival order at the remote is not
    /// guaranteed; last-write-wins timestamps settle it.
    ///
    /// # Errors
    ///
    /// Returns the first failure along with the number of failed writes.
    /// Local state is left as is.
    pub async fn send(self) -> Result<(), WriteFailure> {
        if self.changes.is_empty() {
            return Ok(());
        }
        let total = self.changes.len();
        let remote = self.remote;
        let results = join_all(self.changes.iter().map(|change| send_one(remote.as_ref(), change))).await;

        let mut failed = 0;
        let mut first = None;
        for (change, result) in self.changes.iter().zip(results) {
            if let Err(e) = result {
                warn!(shape_id = %change.shape_id(), error = %e, "remote write failed");
                failed += 1;
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
        match first {
            None => {
                debug!(count = total, "remote writes sent");
                Ok(())
            }
            Some(source) => Err(WriteFailure { failed, total, source }),
        }
    }
}

impl std::fmt::Debug for PendingWrites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWrites").field("changes", &self.changes).finish_non_exhaustive()
    }
}

/// Outcome of a batch with at least one failed write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failed} of {total} remote writes failed: {source}")]
pub struct WriteFailure {
    pub failed: usize,
    pub total: usize,
    #[source]
    pub source: RemoteError,
}

async fn send_one(remote: &dyn RemoteStore, change: &ShapeChange) -> Result<(), RemoteError> {
    match change {
        ShapeChange::Create(shape) => remote.create_shape(shape).await,
        ShapeChange::Update { id, patch } => remote.update_shape(*id, patch).await,
        ShapeChange::Remove(id) => remote.delete_shape(*id).await,
    }
}
