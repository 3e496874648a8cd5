//! End-to-end scenarios: sessions talking to a shared in-memory remote.
#![allow(clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use shapesync::history::ActionType;
use shapesync::store::ShapeChange;
use shapesync::sync::SyncDelta;
use shapesync::{Geometry, MemoryRemote, Session, SessionError, ShapeId, ShapePatch, SyncConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

fn rectangle(x: f64, y: f64) -> Geometry {
    Geometry::Rectangle { x, y, width: 100.0, height: 80.0 }
}

fn x_of(session: &Session, id: ShapeId) -> f64 {
    session.shape(id).unwrap().geometry.position().0
}

async fn next_delta(rx: &mut mpsc::UnboundedReceiver<SyncDelta>) -> SyncDelta {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

fn feed() -> (impl FnMut(SyncDelta) + Send + 'static, mpsc::UnboundedReceiver<SyncDelta>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |delta| tx.send(delta).unwrap(), rx)
}

#[tokio::test]
async fn optimistic_create_survives_load_then_move_is_undone_remotely() -> Result<(), SessionError> {
    let config = SyncConfig::default();
    let remote = Arc::new(MemoryRemote::new());
    let mut client = Session::new(Uuid::new_v4(), remote.clone(), &config);

    // r1 is drawn while the bulk fetch is still in flight.
    let fetch = client.fetch_initial();
    let (r1, create) = client.transact(ActionType::Create, |s| s.create_shape(rectangle(10.0, 10.0), "#D94B4B"))?;
    let fetched = fetch.await.unwrap();
    assert!(fetched.is_empty());

    let count = client.complete_initial_load(fetched);
    assert!(client.shape(r1).is_some());

    let (on_changes, mut rx) = feed();
    let _sync = client.subscribe(Some(count), on_changes);
    create.send().await?;
    let delta = next_delta(&mut rx).await;
    assert_eq!(delta.added.iter().map(|s| s.id).collect::<Vec<_>>(), vec![r1]);
    client.apply_remote(&delta);
    assert_eq!(client.reconciler().pending_len(), 0);

    // The move to x=50 comes back through the stream.
    client
        .transact(ActionType::Move, |s| s.update_shape(r1, &ShapePatch { x: Some(50.0), ..ShapePatch::default() }))?
        .send()
        .await?;
    let delta = next_delta(&mut rx).await;
    assert_eq!(delta.modified[0].geometry.position().0, 50.0);
    client.apply_remote(&delta);
    assert_eq!(x_of(&client, r1), 50.0);

    // Undo reverts locally and issues update_shape(r1, {x: 10}).
    let undo = client.undo()?;
    assert_eq!(x_of(&client, r1), 10.0);
    let [ShapeChange::Update { id, patch }] = undo.changes() else {
        panic!("expected a single update, got {:?}", undo.changes());
    };
    assert_eq!(*id, r1);
    assert_eq!(patch.x, Some(10.0));
    assert_eq!(patch.y, None);
    undo.send().await?;
    assert_eq!(remote.shape(r1).unwrap().geometry.position().0, 10.0);
    Ok(())
}

#[tokio::test]
async fn shapes_created_by_others_during_fetch_are_not_lost() -> Result<(), SessionError> {
    let config = SyncConfig::default();
    let remote = Arc::new(MemoryRemote::new());
    let mut early = Session::new(Uuid::new_v4(), remote.clone(), &config);
    let mut late = Session::new(Uuid::new_v4(), remote.clone(), &config);

    let (existing, writes) = early.create_shape(rectangle(0.0, 0.0), "#fff")?;
    writes.send().await?;

    let fetched = late.fetch_initial().await.unwrap();
    let count = late.complete_initial_load(fetched);
    assert_eq!(count, 1);

    // Created after the fetch resolved but before the subscription started.
    let (racer, writes) = early.create_shape(rectangle(200.0, 0.0), "#fff")?;
    writes.send().await?;

    let (on_changes, mut rx) = feed();
    let _sync = late.subscribe(Some(count), on_changes);
    let delta = next_delta(&mut rx).await;
    assert_eq!(delta.added.len(), 2);
    late.apply_remote(&delta);
    assert!(late.shape(existing).is_some());
    assert!(late.shape(racer).is_some());
    Ok(())
}

#[tokio::test]
async fn lease_blocks_second_client_until_released() -> Result<(), SessionError> {
    let config = SyncConfig::default();
    let remote = Arc::new(MemoryRemote::new());
    let mut alice = Session::new(Uuid::new_v4(), remote.clone(), &config);
    let mut bob = Session::new(Uuid::new_v4(), remote.clone(), &config);

    let (on_changes, mut bob_rx) = feed();
    let _sync = bob.connect(on_changes).await?;

    let (id, writes) = alice.create_shape(rectangle(0.0, 0.0), "#fff")?;
    writes.send().await?;
    alice.acquire_lock(id)?.send().await?;
    while bob.lock_holder(id).is_none() {
        let delta = next_delta(&mut bob_rx).await;
        bob.apply_remote(&delta);
    }

    let refused = bob.update_shape(id, &ShapePatch::default().with_position(9.0, 9.0)).unwrap_err();
    assert_eq!(refused, SessionError::LockConflict { shape_id: id, holder: alice.client_id() });

    alice.release_lock(id).send().await?;
    while bob.lock_holder(id).is_some() {
        let delta = next_delta(&mut bob_rx).await;
        bob.apply_remote(&delta);
    }
    bob.update_shape(id, &ShapePatch::default().with_position(9.0, 9.0))?.send().await?;
    assert_eq!(remote.shape(id).unwrap().geometry.position(), (9.0, 9.0));
    Ok(())
}
