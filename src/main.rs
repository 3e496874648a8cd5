//! Two-client simulation against the in-memory remote store.
//!
//! Alice draws a rectangle, takes its lease, and drags it. Bob's attempt to
//! drag the same shape is refused. Alice then undoes the drag and both
//! views are checked for convergence.

use std::sync::Arc;
use std::time::Duration;

use shapesync::error::ErrorCode;
use shapesync::history::ActionType;
use shapesync::sync::SyncDelta;
use shapesync::{Geometry, MemoryRemote, Session, SessionError, ShapePatch, SyncConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    tracing_subscriber::fmt::init();

    let config = SyncConfig::from_env();
    info!(
        lock_ttl_ms = config.lock_ttl_ms,
        coalesce_window_ms = config.coalesce_window_ms,
        frame_interval_ms = config.frame_interval_ms,
        history_limit = config.history_limit,
        "shapesync demo starting"
    );
    let remote = Arc::new(MemoryRemote::new());
    let settle_for = config.frame_interval() * 4;

    let mut alice = Session::new(Uuid::new_v4(), remote.clone(), &config);
    let mut bob = Session::new(Uuid::new_v4(), remote.clone(), &config);

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    let alice_sync = alice.connect(move |delta| forward(&alice_tx, delta)).await?;
    let bob_sync = bob.connect(move |delta| forward(&bob_tx, delta)).await?;

    // Alice draws a rectangle as one undoable step.
    let (rect_id, writes) = alice.transact(ActionType::Create, |s| {
        s.create_shape(Geometry::Rectangle { x: 10.0, y: 10.0, width: 120.0, height: 80.0 }, "#D94B4B")
    })?;
    writes.send().await?;

    // She grabs it and drags; the nudges undo as one step.
    alice.acquire_lock(rect_id)?.send().await?;
    for step in 1..=5 {
        let offset = f64::from(step) * 8.0;
        let writes = alice.history_coalesce("drag", ActionType::Move, |s| {
            s.update_shape(rect_id, &ShapePatch::default().with_position(10.0 + offset, 10.0 + offset))
        })?;
        writes.send().await?;
    }
    settle(&mut bob, &mut bob_rx, settle_for).await;

    // Bob tries to move the same shape while Alice holds it.
    match bob.update_shape(rect_id, &ShapePatch::default().with_position(400.0, 400.0)) {
        Ok(writes) => writes.send().await?,
        Err(e) => warn!(code = e.error_code(), error = %e, "bob's drag refused"),
    }

    alice.release_lock(rect_id).send().await?;
    alice.undo()?.send().await?;

    settle(&mut alice, &mut alice_rx, settle_for).await;
    settle(&mut bob, &mut bob_rx, settle_for).await;

    for shape in bob.shapes() {
        let (x, y) = shape.geometry.position();
        info!(shape_id = %shape.id, kind = shape.geometry.kind_name(), x, y, locked = shape.locked_by.is_some(), "bob sees");
    }
    if alice.store().snapshot() == bob.store().snapshot() {
        info!(shapes = bob.store().len(), "clients converged");
    } else {
        warn!("clients diverged");
    }

    alice_sync.unsubscribe();
    bob_sync.unsubscribe();
    Ok(())
}

fn forward(tx: &mpsc::UnboundedSender<SyncDelta>, delta: SyncDelta) {
    if tx.send(delta).is_err() {
        debug!("session gone; dropping delta");
    }
}

/// Let a few frames pass, then fold every delivered delta into `session`.
async fn settle(session: &mut Session, rx: &mut mpsc::UnboundedReceiver<SyncDelta>, wait: Duration) {
    tokio::time::sleep(wait).await;
    while let Ok(delta) = rx.try_recv() {
        session.apply_remote(&delta);
    }
}
