#![allow(clippy::float_cmp)]

use super::*;
use crate::shape::test_helpers::{circle, rect, text};

#[test]
fn rectangle_bounds_span_width_and_height() {
    let b = rect(10.0, 20.0).bounds();
    assert_eq!(b, Bounds { min_x: 10.0, min_y: 20.0, max_x: 110.0, max_y: 100.0 });
    assert_eq!(b.width(), 100.0);
    assert_eq!(b.height(), 80.0);
}

#[test]
fn rectangle_with_negative_size_normalizes() {
    let mut shape = rect(100.0, 100.0);
    shape.geometry = Geometry::Rectangle { x: 100.0, y: 100.0, width: -40.0, height: -20.0 };
    let b = shape.bounds();
    assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (60.0, 80.0, 100.0, 100.0));
}

#[test]
fn circle_bounds_are_centered() {
    let b = circle(50.0, 50.0).bounds();
    assert_eq!(b, Bounds { min_x: 25.0, min_y: 25.0, max_x: 75.0, max_y: 75.0 });
    assert_eq!(circle(50.0, 50.0).center(), (50.0, 50.0));
}

#[test]
fn text_extent_uses_widest_line() {
    let (w, h) = text_extent("ab\nabcd", 10.0);
    assert!((w - 4.0 * 10.0 * TEXT_CHAR_WIDTH_RATIO).abs() < 1e-9);
    assert!((h - 2.0 * 10.0 * TEXT_LINE_HEIGHT_RATIO).abs() < 1e-9);
}

#[test]
fn empty_text_has_one_line_of_height() {
    let (w, h) = text_extent("", 10.0);
    assert_eq!(w, 0.0);
    assert!((h - 10.0 * TEXT_LINE_HEIGHT_RATIO).abs() < 1e-9);
}

#[test]
fn text_bounds_start_at_anchor() {
    let shape = text(5.0, 6.0, "abc");
    assert_eq!(shape.left(), 5.0);
    assert_eq!(shape.top(), 6.0);
    assert!(shape.right() > 5.0);
    assert!(shape.bottom() > 6.0);
}

#[test]
fn rectangle_center_and_edges() {
    let shape = rect(0.0, 0.0);
    assert_eq!(shape.center(), (50.0, 40.0));
    assert_eq!((shape.left(), shape.right(), shape.top(), shape.bottom()), (0.0, 100.0, 0.0, 80.0));
}

#[test]
fn enclosing_unions_boxes() {
    let a = rect(0.0, 0.0).bounds();
    let b = circle(200.0, 200.0).bounds();
    let all = Bounds::enclosing([&a, &b]).unwrap();
    assert_eq!(all, Bounds { min_x: 0.0, min_y: 0.0, max_x: 225.0, max_y: 225.0 });
    assert!(Bounds::enclosing(std::iter::empty()).is_none());
}

#[test]
fn translation_offsets_anchor() {
    let patch = circle(10.0, 10.0).translation(5.0, -5.0);
    assert_eq!(patch, ShapePatch::default().with_position(15.0, 5.0));
}
