#![allow(clippy::float_cmp)]

use serde_json::json;

use super::test_helpers::{author, circle, rect, stamp, text};
use super::*;

// =============================================================
// Serde
// =============================================================

#[test]
fn shape_serializes_with_flat_type_tag() {
    let shape = rect(10.0, 20.0);
    let value = serde_json::to_value(&shape).unwrap();
    assert_eq!(value["type"], "rectangle");
    assert_eq!(value["x"], 10.0);
    assert_eq!(value["width"], 100.0);
    assert_eq!(value["locked_by"], serde_json::Value::Null);
}

#[test]
fn shape_deserializes_without_optional_fields() {
    let id = Uuid::new_v4();
    let value = json!({
        "id": id,
        "type": "circle",
        "x": 5.0,
        "y": 6.0,
        "radius": 7.0,
        "color": "red",
        "z_index": 3,
        "created_by": author(),
        "created_at": 1,
        "last_modified_by": author(),
        "last_modified_at": 2,
    });
    let shape: Shape = serde_json::from_value(value).unwrap();
    assert_eq!(shape.id, id);
    assert_eq!(shape.geometry, Geometry::Circle { x: 5.0, y: 6.0, radius: 7.0 });
    assert_eq!(shape.rotation, 0.0);
    assert!(shape.locked_by.is_none());
    assert!(shape.locked_at.is_none());
}

#[test]
fn patch_omits_absent_fields() {
    let patch = ShapePatch::default().with_position(1.0, 2.0);
    let value = serde_json::to_value(&patch).unwrap();
    assert_eq!(value, json!({"x": 1.0, "y": 2.0}));
}

#[test]
fn patch_null_lock_means_clear() {
    let patch: ShapePatch = serde_json::from_value(json!({"locked_by": null, "locked_at": null})).unwrap();
    assert_eq!(patch.locked_by, Some(None));
    assert_eq!(patch.locked_at, Some(None));

    let absent: ShapePatch = serde_json::from_value(json!({"x": 3.0})).unwrap();
    assert_eq!(absent.locked_by, None);
}

#[test]
fn patch_clear_lock_serializes_as_null() {
    let patch = ShapePatch::default().with_lock(None, None);
    let value = serde_json::to_value(&patch).unwrap();
    assert_eq!(value, json!({"locked_by": null, "locked_at": null}));
}

// =============================================================
// apply
// =============================================================

#[test]
fn apply_moves_every_variant() {
    let patch = ShapePatch::default().with_position(50.0, 60.0);
    for mut shape in [rect(0.0, 0.0), circle(0.0, 0.0), text(0.0, 0.0, "hi")] {
        shape.apply(&patch);
        assert_eq!(shape.geometry.position(), (50.0, 60.0));
    }
}

#[test]
fn apply_ignores_fields_foreign_to_variant() {
    let mut shape = rect(0.0, 0.0);
    let before = shape.clone();
    shape.apply(&ShapePatch::default().with_radius(99.0).with_text("nope"));
    assert_eq!(shape, before);
}

#[test]
fn apply_sets_text_and_font_size() {
    let mut shape = text(0.0, 0.0, "old");
    shape.apply(&ShapePatch::default().with_text("new").with_font_size(24.0));
    assert_eq!(
        shape.geometry,
        Geometry::Text { x: 0.0, y: 0.0, text: "new".into(), font_size: 24.0 }
    );
}

#[test]
fn apply_sets_and_clears_lock() {
    let holder = Uuid::new_v4();
    let mut shape = rect(0.0, 0.0);
    shape.apply(&ShapePatch::default().with_lock(Some(holder), Some(5)));
    assert_eq!(shape.locked_by, Some(holder));
    assert_eq!(shape.locked_at, Some(5));

    shape.apply(&ShapePatch::default().with_lock(None, None));
    assert!(shape.locked_by.is_none());
    assert!(shape.locked_at.is_none());
}

#[test]
fn apply_stamped_updates_provenance() {
    let other = Uuid::new_v4();
    let mut shape = rect(0.0, 0.0);
    shape.apply(&ShapePatch::default().with_color("blue").stamped(Stamp { by: other, at: 4242 }));
    assert_eq!(shape.color, "blue");
    assert_eq!(shape.last_modified_by, other);
    assert_eq!(shape.last_modified_at, 4242);
    assert_eq!(shape.created_by, author());
}

// =============================================================
// capture
// =============================================================

#[test]
fn capture_then_apply_restores_state() {
    let original = rect(10.0, 10.0);
    let patch = ShapePatch::default().with_position(50.0, 70.0).with_size(5.0, 6.0).with_color("green");
    let before = original.capture(&patch);

    let mut edited = original.clone();
    edited.apply(&patch);
    assert_ne!(edited, original);

    edited.apply(&before);
    assert_eq!(edited, original);
}

#[test]
fn capture_only_includes_touched_fields() {
    let shape = circle(3.0, 4.0);
    let before = shape.capture(&ShapePatch::default().with_radius(10.0));
    assert_eq!(before, ShapePatch { radius: Some(25.0), ..ShapePatch::default() });
}

#[test]
fn capture_skips_fields_variant_lacks() {
    let shape = circle(3.0, 4.0);
    let before = shape.capture(&ShapePatch::default().with_size(1.0, 1.0));
    assert!(before.is_empty());
}

// =============================================================
// Patch merging
// =============================================================

#[test]
fn overlay_prefers_other() {
    let mut base = ShapePatch::default().with_position(1.0, 2.0).with_color("red");
    base.overlay(&ShapePatch::default().with_position(3.0, 4.0));
    assert_eq!(base, ShapePatch::default().with_position(3.0, 4.0).with_color("red"));
}

#[test]
fn fill_missing_keeps_existing() {
    let mut base = ShapePatch::default().with_position(1.0, 2.0);
    base.fill_missing(&ShapePatch::default().with_position(9.0, 9.0).with_rotation(45.0));
    assert_eq!(base, ShapePatch::default().with_position(1.0, 2.0).with_rotation(45.0));
}

#[test]
fn content_strips_provenance_and_lock() {
    let patch = ShapePatch::default()
        .with_position(1.0, 1.0)
        .with_lock(Some(author()), Some(1))
        .stamped(stamp(9));
    assert_eq!(patch.content(), ShapePatch::default().with_position(1.0, 1.0));
}

#[test]
fn field_names_skip_provenance() {
    let patch = ShapePatch::default().with_color("red").with_z_index(3).stamped(stamp(9));
    assert_eq!(patch.field_names(), vec!["color", "z_index"]);
    assert!(ShapePatch::default().stamped(stamp(9)).field_names().is_empty());
}

#[test]
fn retain_fields_drops_rejected_and_keeps_provenance() {
    let mut patch = ShapePatch::default().with_position(1.0, 2.0).with_color("red").stamped(stamp(9));
    patch.retain_fields(|name| name != "x");
    assert_eq!(patch, ShapePatch { y: Some(2.0), ..ShapePatch::default() }.with_color("red").stamped(stamp(9)));
}

#[test]
fn new_shape_is_unlocked_and_stamped() {
    let shape = Shape::new(Geometry::Circle { x: 0.0, y: 0.0, radius: 1.0 }, "red", 7, stamp(123));
    assert_eq!(shape.z_index, 7);
    assert_eq!(shape.created_at, 123);
    assert_eq!(shape.last_modified_at, 123);
    assert!(shape.locked_by.is_none());
    assert_eq!(shape.geometry.kind_name(), "circle");
}
