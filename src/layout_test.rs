#![allow(clippy::float_cmp)]

use super::*;
use crate::shape::test_helpers::{circle, rect};

fn apply_all(shapes: &mut [Shape], patches: &[(ShapeId, ShapePatch)]) {
    for (id, patch) in patches {
        if let Some(shape) = shapes.iter_mut().find(|s| s.id == *id) {
            shape.apply(patch);
        }
    }
}

#[test]
fn align_needs_two_shapes() {
    let a = rect(0.0, 0.0);
    assert!(align(&[&a], Alignment::Left).is_empty());
}

#[test]
fn align_left_matches_leftmost_edge() {
    let mut shapes = vec![rect(10.0, 0.0), rect(40.0, 50.0), circle(100.0, 100.0)];
    let refs: Vec<&Shape> = shapes.iter().collect();
    let patches = align(&refs, Alignment::Left);
    assert_eq!(patches.len(), 2);
    apply_all(&mut shapes, &patches);
    for shape in &shapes {
        assert_eq!(shape.left(), 10.0);
    }
    // y untouched
    assert_eq!(shapes[1].top(), 50.0);
}

#[test]
fn align_bottom_matches_lowest_edge() {
    let mut shapes = vec![rect(0.0, 0.0), rect(0.0, 200.0)];
    let refs: Vec<&Shape> = shapes.iter().collect();
    let patches = align(&refs, Alignment::Bottom);
    apply_all(&mut shapes, &patches);
    assert_eq!(shapes[0].bottom(), 280.0);
    assert_eq!(shapes[1].bottom(), 280.0);
}

#[test]
fn align_center_horizontal_uses_enclosing_center() {
    let mut shapes = vec![rect(0.0, 0.0), circle(300.0, 0.0)];
    let refs: Vec<&Shape> = shapes.iter().collect();
    let patches = align(&refs, Alignment::CenterHorizontal);
    apply_all(&mut shapes, &patches);
    // enclosing x range is [0, 325] -> center 162.5
    assert_eq!(shapes[0].center().0, 162.5);
    assert_eq!(shapes[1].center().0, 162.5);
}

#[test]
fn align_already_aligned_yields_nothing() {
    let a = rect(0.0, 0.0);
    let b = rect(0.0, 300.0);
    assert!(align(&[&a, &b], Alignment::Left).is_empty());
}

#[test]
fn distribute_needs_three_shapes() {
    let a = rect(0.0, 0.0);
    let b = rect(500.0, 0.0);
    assert!(distribute(&[&a, &b], Axis::Horizontal).is_empty());
}

#[test]
fn distribute_horizontal_equalizes_gaps() {
    let mut shapes = vec![rect(0.0, 0.0), rect(130.0, 0.0), rect(400.0, 0.0)];
    let refs: Vec<&Shape> = shapes.iter().collect();
    let patches = distribute(&refs, Axis::Horizontal);
    assert_eq!(patches.len(), 1);
    apply_all(&mut shapes, &patches);
    // span 0..500, three 100-wide boxes -> gaps of 100
    assert_eq!(shapes[1].left(), 200.0);
    assert_eq!(shapes[0].left(), 0.0);
    assert_eq!(shapes[2].left(), 400.0);
}

#[test]
fn distribute_vertical_sorts_by_position() {
    let mut shapes = vec![rect(0.0, 600.0), rect(0.0, 0.0), rect(0.0, 50.0)];
    let refs: Vec<&Shape> = shapes.iter().collect();
    let patches = distribute(&refs, Axis::Vertical);
    apply_all(&mut shapes, &patches);
    // span 0..680, three 80-tall boxes -> gaps of 220
    assert_eq!(shapes[2].top(), 300.0);
    assert_eq!(shapes[0].top(), 600.0);
}
