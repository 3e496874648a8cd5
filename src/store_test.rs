#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::shape::test_helpers::{author, at_z, circle, modified_at, pos, rect, stamp, text};

fn store_with(shapes: Vec<Shape>) -> ShapeStore {
    let mut store = ShapeStore::new();
    for shape in shapes {
        store.create(shape).unwrap();
    }
    store
}

// =============================================================
// CRUD
// =============================================================

#[test]
fn new_store_is_empty() {
    let store = ShapeStore::new();
    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert_eq!(store.next_z_index(), 0);
}

#[test]
fn create_rejects_duplicate_id() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    assert_eq!(store.create(shape.clone()), Err(StoreError::DuplicateId(shape.id)));
    assert_eq!(store.len(), 1);
}

#[test]
fn update_applies_patch() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    assert!(store.update(shape.id, &ShapePatch::default().with_position(5.0, 6.0)));
    assert_eq!(pos(store.get(shape.id).unwrap()), (5.0, 6.0));
}

#[test]
fn update_unknown_id_is_a_miss() {
    let mut store = ShapeStore::new();
    assert!(!store.update(Uuid::new_v4(), &ShapePatch::default().with_color("red")));
    assert!(store.is_empty());
}

#[test]
fn remove_returns_shape_and_tombstones() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    assert_eq!(store.remove(shape.id), Some(shape.clone()));
    assert!(store.remove(shape.id).is_none());
    assert!(store.is_tombstoned(shape.id));
}

#[test]
fn create_after_remove_clears_tombstone() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.remove(shape.id);
    store.create(shape.clone()).unwrap();
    assert!(!store.is_tombstoned(shape.id));
}

#[test]
fn clear_removes_everything_in_draw_order() {
    let a = at_z(rect(0.0, 0.0), 2);
    let b = at_z(circle(0.0, 0.0), 0);
    let mut store = store_with(vec![a.clone(), b.clone()]);
    let removed = store.clear();
    assert_eq!(removed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    assert!(store.is_empty());
    assert!(store.is_tombstoned(a.id));
}

#[test]
fn get_all_sorts_by_z_then_id() {
    let a = at_z(rect(0.0, 0.0), 5);
    let b = at_z(circle(0.0, 0.0), 1);
    let c = at_z(text(0.0, 0.0, "t"), 3);
    let store = store_with(vec![a.clone(), b.clone(), c.clone()]);
    let order: Vec<ShapeId> = store.get_all().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![b.id, c.id, a.id]);
    assert_eq!(store.next_z_index(), 6);
}

#[test]
fn apply_batch_reports_misses() {
    let existing = rect(0.0, 0.0);
    let fresh = circle(1.0, 1.0);
    let ghost = Uuid::new_v4();
    let mut store = store_with(vec![existing.clone()]);

    let report = store.apply_batch(vec![
        ShapeChange::Create(fresh.clone()),
        ShapeChange::Update { id: existing.id, patch: ShapePatch::default().with_color("blue") },
        ShapeChange::Update { id: ghost, patch: ShapePatch::default().with_color("blue") },
        ShapeChange::Create(existing.clone()),
        ShapeChange::Remove(fresh.id),
    ]);

    assert_eq!(report.applied, 3);
    assert_eq!(report.missed, vec![ghost, existing.id]);
    assert_eq!(store.get(existing.id).unwrap().color, "blue");
    assert!(!store.contains(fresh.id));
}

#[test]
fn replace_all_swaps_contents() {
    let old = rect(0.0, 0.0);
    let new = circle(0.0, 0.0);
    let mut store = store_with(vec![old.clone()]);
    store.replace_all(vec![new.clone()]);
    assert!(!store.contains(old.id));
    assert!(store.contains(new.id));
}

// =============================================================
// Remote application
// =============================================================

#[test]
fn remote_added_inserts() {
    let shape = rect(0.0, 0.0);
    let mut store = ShapeStore::new();
    assert_eq!(store.apply_remote(ChangeKind::Added, &shape), ApplyOutcome::Inserted);
    assert_eq!(store.get(shape.id), Some(&shape));
}

#[test]
fn remote_event_applied_twice_is_idempotent() {
    let shape = rect(0.0, 0.0);
    let mut moved = modified_at(shape.clone(), 2000);
    moved.apply(&ShapePatch::default().with_position(50.0, 10.0));

    for kind in [ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed] {
        let mut once = store_with(vec![shape.clone()]);
        once.apply_remote(kind, &moved);
        let mut twice = store_with(vec![shape.clone()]);
        twice.apply_remote(kind, &moved);
        twice.apply_remote(kind, &moved);
        assert_eq!(once.snapshot(), twice.snapshot(), "{kind:?}");
    }
}

#[test]
fn remote_modified_newer_replaces() {
    let shape = rect(10.0, 10.0);
    let mut store = store_with(vec![shape.clone()]);
    let mut remote = modified_at(shape.clone(), 2000);
    remote.apply(&ShapePatch::default().with_position(50.0, 10.0));
    assert_eq!(store.apply_remote(ChangeKind::Modified, &remote), ApplyOutcome::Replaced);
    assert_eq!(pos(store.get(shape.id).unwrap()), (50.0, 10.0));
}

#[test]
fn remote_modified_older_is_stale() {
    let shape = modified_at(rect(10.0, 10.0), 5000);
    let mut store = store_with(vec![shape.clone()]);
    let mut remote = modified_at(shape.clone(), 4000);
    remote.apply(&ShapePatch::default().with_position(99.0, 99.0));
    assert_eq!(store.apply_remote(ChangeKind::Modified, &remote), ApplyOutcome::Stale);
    assert_eq!(pos(store.get(shape.id).unwrap()), (10.0, 10.0));
}

#[test]
fn remote_modified_unknown_is_miss() {
    let mut store = ShapeStore::new();
    assert_eq!(store.apply_remote(ChangeKind::Modified, &rect(0.0, 0.0)), ApplyOutcome::Miss);
    assert!(store.is_empty());
}

#[test]
fn remote_removed_deletes_and_misses_after() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    assert_eq!(store.apply_remote(ChangeKind::Removed, &shape), ApplyOutcome::Removed);
    assert_eq!(store.apply_remote(ChangeKind::Removed, &shape), ApplyOutcome::Miss);
}

#[test]
fn late_echo_does_not_resurrect_removed_shape() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.remove(shape.id);
    assert_eq!(store.apply_remote(ChangeKind::Added, &shape), ApplyOutcome::Stale);
    assert!(!store.contains(shape.id));
}

#[test]
fn newer_add_after_remove_is_accepted() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.remove(shape.id);
    let recreated = modified_at(shape.clone(), 9000);
    assert_eq!(store.apply_remote(ChangeKind::Added, &recreated), ApplyOutcome::Inserted);
    assert!(!store.is_tombstoned(shape.id));
}

#[test]
fn remote_version_keeps_newer_local_fields() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.update(shape.id, &ShapePatch::default().with_color("red").stamped(stamp(3000)));

    // Another client's move, made before the local recolor.
    let mut moved = modified_at(shape.clone(), 2000);
    moved.apply(&ShapePatch::default().with_position(50.0, 0.0));
    assert_eq!(store.apply_remote(ChangeKind::Modified, &moved), ApplyOutcome::Replaced);

    let local = store.get(shape.id).unwrap();
    assert_eq!(pos(local), (50.0, 0.0));
    assert_eq!(local.color, "red");
    assert_eq!(local.last_modified_at, 3000);
    assert_eq!(store.unconfirmed_writes(shape.id), 1);
}

#[test]
fn echo_of_local_write_confirms_it() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.update(shape.id, &ShapePatch::default().with_color("red").stamped(stamp(3000)));

    let mut echo = modified_at(shape.clone(), 3000);
    echo.color = "red".to_owned();
    assert_eq!(store.apply_remote(ChangeKind::Modified, &echo), ApplyOutcome::Replaced);
    assert_eq!(store.unconfirmed_writes(shape.id), 0);

    assert_eq!(store.apply_remote(ChangeKind::Modified, &modified_at(shape.clone(), 2500)), ApplyOutcome::Stale);
    assert_eq!(store.get(shape.id).unwrap().color, "red");
}

#[test]
fn unstamped_updates_are_not_tracked() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.update(shape.id, &ShapePatch::default().with_lock(Some(author()), Some(1500)));
    store.update(shape.id, &ShapePatch::default().with_position(1.0, 1.0));
    assert_eq!(store.unconfirmed_writes(shape.id), 0);
}

#[test]
fn removal_forgets_unconfirmed_writes() {
    let shape = rect(0.0, 0.0);
    let mut store = store_with(vec![shape.clone()]);
    store.update(shape.id, &ShapePatch::default().with_color("red").stamped(stamp(3000)));
    store.remove(shape.id);
    assert_eq!(store.unconfirmed_writes(shape.id), 0);
}

#[test]
fn tombstones_are_capped_oldest_first() {
    let shapes: Vec<Shape> = (0..4).map(|i| rect(f64::from(i), 0.0)).collect();
    let mut store = ShapeStore::with_tombstone_limit(2);
    for shape in &shapes {
        store.create(shape.clone()).unwrap();
    }
    for shape in &shapes {
        store.remove(shape.id);
    }
    assert_eq!(store.tombstone_count(), 2);
    assert!(!store.is_tombstoned(shapes[0].id));
    assert!(!store.is_tombstoned(shapes[1].id));
    assert!(store.is_tombstoned(shapes[2].id));
    assert!(store.is_tombstoned(shapes[3].id));
}

#[test]
fn recreated_ids_do_not_pin_tombstones() {
    let mut store = ShapeStore::with_tombstone_limit(2);
    let churn = rect(0.0, 0.0);
    for _ in 0..10 {
        store.create(churn.clone()).unwrap();
        store.remove(churn.id);
    }
    let a = circle(0.0, 0.0);
    let b = circle(1.0, 1.0);
    store.create(a.clone()).unwrap();
    store.create(b.clone()).unwrap();
    store.remove(a.id);
    store.remove(b.id);

    assert_eq!(store.tombstone_count(), 2);
    assert!(!store.is_tombstoned(churn.id));
    assert!(store.is_tombstoned(a.id));
    assert!(store.is_tombstoned(b.id));
}
