//! Align and distribute helpers.
//!
//! Both work on unrotated bounds and return position patches only for shapes
//! that actually move.

#[cfg(test)]
#[path = "layout_test.rs"]
mod layout_test;

use serde::{Deserialize, Serialize};

use crate::geometry::Bounds;
use crate::shape::{Shape, ShapeId, ShapePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Right,
    Top,
    Bottom,
    /// Centers share one x coordinate.
    CenterHorizontal,
    /// Centers share one y coordinate.
    CenterVertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Align shapes against the box enclosing all of them. Needs two or more.
#[must_use]
pub fn align(shapes: &[&Shape], alignment: Alignment) -> Vec<(ShapeId, ShapePatch)> {
    if shapes.len() < 2 {
        return Vec::new();
    }
    let boxes: Vec<Bounds> = shapes.iter().map(|s| s.bounds()).collect();
    let Some(all) = Bounds::enclosing(&boxes) else {
        return Vec::new();
    };
    let (cx, cy) = all.center();

    shapes
        .iter()
        .zip(&boxes)
        .filter_map(|(shape, b)| {
            let (bx, by) = b.center();
            let (dx, dy) = match alignment {
                Alignment::Left => (all.min_x - b.min_x, 0.0),
                Alignment::Right => (all.max_x - b.max_x, 0.0),
                Alignment::Top => (0.0, all.min_y - b.min_y),
                Alignment::Bottom => (0.0, all.max_y - b.max_y),
                Alignment::CenterHorizontal => (cx - bx, 0.0),
                Alignment::CenterVertical => (0.0, cy - by),
            };
            moved(shape, dx, dy)
        })
        .collect()
}

/// Space shapes evenly along `axis`. The outermost two stay put; needs
/// three or more.
#[must_use]
pub fn distribute(shapes: &[&Shape], axis: Axis) -> Vec<(ShapeId, ShapePatch)> {
    if shapes.len() < 3 {
        return Vec::new();
    }
    let mut items: Vec<(&Shape, Bounds)> = shapes.iter().map(|s| (*s, s.bounds())).collect();
    let start = |b: &Bounds| match axis {
        Axis::Horizontal => b.min_x,
        Axis::Vertical => b.min_y,
    };
    let size = |b: &Bounds| match axis {
        Axis::Horizontal => b.width(),
        Axis::Vertical => b.height(),
    };
    items.sort_by(|a, b| start(&a.1).total_cmp(&start(&b.1)).then_with(|| a.0.id.cmp(&b.0.id)));

    let first = start(&items[0].1);
    let last = &items[items.len() - 1].1;
    let span = start(last) + size(last) - first;
    let occupied: f64 = items.iter().map(|(_, b)| size(b)).sum();
    #[allow(clippy::cast_precision_loss)]
    let gap = (span - occupied) / (items.len() - 1) as f64;

    let mut cursor = first;
    let mut out = Vec::new();
    let count = items.len();
    for (i, (shape, b)) in items.into_iter().enumerate() {
        if i > 0 && i < count - 1 {
            let delta = cursor - start(&b);
            let (dx, dy) = match axis {
                Axis::Horizontal => (delta, 0.0),
                Axis::Vertical => (0.0, delta),
            };
            out.extend(moved(shape, dx, dy));
        }
        cursor += size(&b) + gap;
    }
    out
}

fn moved(shape: &Shape, dx: f64, dy: f64) -> Option<(ShapeId, ShapePatch)> {
    if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
        return None;
    }
    Some((shape.id, shape.translation(dx, dy)))
}
