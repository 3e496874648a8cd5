//! Sync service — frame-rate delivery of the remote change stream.
//!
//! DESIGN
//! ======
//! A worker task owns the [`Subscription`]. Snapshots are folded into a
//! [`SyncBuffer`] that keeps one event per shape id, and a frame ticker
//! flushes the buffer to the caller's `on_changes` at most once per frame.
//! However bursty the remote is, the caller sees at most one delta per tick.
//!
//! The first snapshot after subscribing usually repeats the initial fetch.
//! When its `added` count equals the fetched count it is dropped; when it is
//! larger, someone created shapes during the fetch window and it is processed
//! like any other snapshot.
//!
//! Dropping or unsubscribing the [`SyncHandle`] stops delivery at once and
//! discards anything still buffered.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::remote::{ChangeEvent, ChangeKind, RemoteStore, Subscription};
use crate::shape::{Shape, ShapeId};

// =============================================================================
// DELTA
// =============================================================================

/// Coalesced changes delivered for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDelta {
    pub added: Vec<Shape>,
    pub modified: Vec<Shape>,
    pub removed: Vec<Shape>,
}

impl SyncDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Every shape id named by the delta.
    pub fn shape_ids(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.added.iter().chain(&self.modified).chain(&self.removed).map(|s| s.id)
    }
}

// =============================================================================
// BUFFER
// =============================================================================

/// Per-frame buffer: latest event per shape id, in first-arrival order.
#[derive(Debug, Default)]
pub struct SyncBuffer {
    pending: HashMap<ShapeId, ChangeEvent>,
    order: Vec<ShapeId>,
    initial_count: Option<usize>,
    first_seen: bool,
}

impl SyncBuffer {
    /// `initial_count` is the number of shapes a prior bulk fetch returned,
    /// or `None` if there was no fetch.
    #[must_use]
    pub fn new(initial_count: Option<usize>) -> Self {
        Self { initial_count, ..Self::default() }
    }

    /// Fold one snapshot in. Returns `false` if it was dropped as a duplicate
    /// of the initial fetch.
    pub fn ingest(&mut self, events: Vec<ChangeEvent>) -> bool {
        if !self.first_seen {
            self.first_seen = true;
            if let Some(fetched) = self.initial_count {
                let added = events.iter().filter(|e| e.kind == ChangeKind::Added).count();
                if added == fetched {
                    info!(count = added, "skipped first snapshot duplicating initial load");
                    return false;
                }
                debug!(added, fetched, "processing first snapshot");
            }
        }

        for event in events {
            let id = event.shape.id;
            match self.pending.entry(id) {
                Entry::Vacant(slot) => {
                    self.order.push(id);
                    slot.insert(event);
                }
                Entry::Occupied(mut slot) => {
                    let current = slot.get_mut();
                    // Still unseen by the caller, so a later edit keeps it an add.
                    if current.kind == ChangeKind::Added && event.kind == ChangeKind::Modified {
                        current.shape = event.shape;
                    } else {
                        *current = event;
                    }
                }
            }
        }
        true
    }

    /// Drain everything buffered into one delta, or `None` if nothing is.
    pub fn take(&mut self) -> Option<SyncDelta> {
        if self.order.is_empty() {
            return None;
        }
        let mut delta = SyncDelta::default();
        for id in self.order.drain(..) {
            let Some(event) = self.pending.remove(&id) else {
                continue;
            };
            match event.kind {
                ChangeKind::Added => delta.added.push(event.shape),
                ChangeKind::Modified => delta.modified.push(event.shape),
                ChangeKind::Removed => delta.removed.push(event.shape),
            }
        }
        Some(delta)
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.order.len()
    }
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SyncService {
    frame_interval: Duration,
}

impl SyncService {
    #[must_use]
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Subscribe to `remote` and deliver coalesced deltas to `on_changes`,
    /// one call per frame at most. Must be called inside a tokio runtime.
    pub fn subscribe<F>(&self, remote: &dyn RemoteStore, initial_count: Option<usize>, on_changes: F) -> SyncHandle
    where
        F: FnMut(SyncDelta) + Send + 'static,
    {
        let subscription = remote.subscribe();
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_worker(
            subscription,
            SyncBuffer::new(initial_count),
            self.frame_interval,
            Arc::clone(&active),
            on_changes,
        ));
        debug!(frame_ms = self.frame_interval.as_millis(), ?initial_count, "sync subscribed");
        SyncHandle { active, task }
    }
}

async fn run_worker<F>(
    mut subscription: Subscription,
    mut buffer: SyncBuffer,
    frame_interval: Duration,
    active: Arc<AtomicBool>,
    mut on_changes: F,
) where
    F: FnMut(SyncDelta) + Send + 'static,
{
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => {
                if !active.load(Ordering::Acquire) {
                    break;
                }
                if let Some(delta) = buffer.take() {
                    on_changes(delta);
                }
            }
            snapshot = subscription.recv() => {
                if let Some(events) = snapshot {
                    buffer.ingest(events);
                } else {
                    debug!(pending = buffer.pending_len(), "remote feed closed");
                    if active.load(Ordering::Acquire)
                        && let Some(delta) = buffer.take()
                    {
                        on_changes(delta);
                    }
                    break;
                }
            }
        }
    }
}

/// Live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SyncHandle {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Stop delivery. Buffered events are discarded; writes already in
    /// flight are not recalled.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.task.abort();
    }
}
