//! In-memory remote store.
//!
//! Holds the shared collection behind a mutex and fans every write out to
//! all subscribers as a one-event snapshot. Used by the demo binary and by
//! tests; it can be switched offline to exercise network failures.
//!
//! Writes are last-write-wins per field: each stamped field remembers when it
//! was last written, a field older than that is skipped, and a shape's
//! `last_modified_at` never moves backwards. Every accepted write is still
//! published with the shape as stored, so a late writer sees what won.
//!
//! Leases are not checked here. Lock discipline is client-side only.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::{ChangeEvent, RemoteError, RemoteStore, Subscription};
use crate::shape::{Shape, ShapeId, ShapePatch};

#[derive(Debug)]
struct Inner {
    shapes: HashMap<ShapeId, Shape>,
    /// Per shape, when each field was last written. Unlisted fields date
    /// from the shape's creation.
    written: HashMap<ShapeId, HashMap<&'static str, i64>>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<ChangeEvent>>>,
    online: bool,
    writes: usize,
}

#[derive(Debug)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shapes(Vec::new())
    }

    /// Start with `shapes` already stored.
    #[must_use]
    pub fn with_shapes(shapes: Vec<Shape>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                shapes: shapes.into_iter().map(|s| (s.id, s)).collect(),
                written: HashMap::new(),
                subscribers: Vec::new(),
                online: true,
                writes: 0,
            }),
        }
    }

    /// While offline every call fails with [`RemoteError::Network`].
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    #[must_use]
    pub fn shape(&self, id: ShapeId) -> Option<Shape> {
        self.lock().shapes.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().shapes.is_empty()
    }

    /// Successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn ensure_online(&self) -> Result<(), RemoteError> {
        if self.online {
            Ok(())
        } else {
            Err(RemoteError::Network("remote store offline".to_owned()))
        }
    }

    /// Send one event to every live subscriber, pruning closed ones.
    fn publish(&mut self, event: ChangeEvent) {
        self.writes += 1;
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| tx.send(vec![event.clone()]).is_ok());
        let pruned = before - self.subscribers.len();
        if pruned > 0 {
            debug!(pruned, "dropped closed subscribers");
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_shape(&self, shape: &Shape) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.ensure_online()?;
        if let Some(current) = inner.shapes.get(&shape.id)
            && current.last_modified_at > shape.last_modified_at
        {
            debug!(shape_id = %shape.id, incoming = shape.last_modified_at, current = current.last_modified_at, "kept newer stored shape");
            let current = current.clone();
            inner.publish(ChangeEvent::modified(current));
            return Ok(());
        }
        inner.written.remove(&shape.id);
        let existed = inner.shapes.insert(shape.id, shape.clone()).is_some();
        let event = if existed { ChangeEvent::modified(shape.clone()) } else { ChangeEvent::added(shape.clone()) };
        inner.publish(event);
        Ok(())
    }

    async fn update_shape(&self, id: ShapeId, patch: &ShapePatch) -> Result<(), RemoteError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.ensure_online()?;
        let shape = inner.shapes.get_mut(&id).ok_or(RemoteError::NotFound(id))?;
        let accepted = match patch.last_modified_at {
            Some(at) => newer_fields(patch, at, shape, inner.written.entry(id).or_default()),
            None => patch.clone(),
        };
        shape.apply(&accepted);
        let updated = shape.clone();
        inner.publish(ChangeEvent::modified(updated));
        Ok(())
    }

    async fn delete_shape(&self, id: ShapeId) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.ensure_online()?;
        inner.written.remove(&id);
        // Deleting an absent shape succeeds quietly, like most document stores.
        if let Some(removed) = inner.shapes.remove(&id) {
            inner.publish(ChangeEvent::removed(removed));
        }
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Shape>, RemoteError> {
        let inner = self.lock();
        inner.ensure_online()?;
        Ok(sorted(&inner.shapes))
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let initial: Vec<ChangeEvent> = sorted(&inner.shapes).into_iter().map(ChangeEvent::added).collect();
        // The receiver is alive, so the initial send cannot fail.
        if tx.send(initial).is_ok() {
            inner.subscribers.push(tx);
        }
        Subscription::new(rx)
    }
}

/// The part of `patch`, written at `at`, that is not older than what `shape`
/// already holds. Records the write time of every accepted field.
fn newer_fields(patch: &ShapePatch, at: i64, shape: &Shape, written: &mut HashMap<&'static str, i64>) -> ShapePatch {
    let mut accepted = patch.clone();
    accepted.retain_fields(|name| at >= written.get(name).copied().unwrap_or(shape.created_at));
    for name in accepted.field_names() {
        written.insert(name, at);
    }
    if at < shape.last_modified_at {
        accepted.last_modified_by = None;
        accepted.last_modified_at = None;
    }
    let skipped = patch.field_names().len() - accepted.field_names().len();
    if skipped > 0 {
        debug!(shape_id = %shape.id, at, skipped, "skipped fields older than stored values");
    }
    accepted
}

fn sorted(shapes: &HashMap<ShapeId, Shape>) -> Vec<Shape> {
    let mut out: Vec<Shape> = shapes.values().cloned().collect();
    out.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
    out
}
