//! Axis-aligned bounds, centers, and edges for every shape variant.
//!
//! Rotation is not applied; bounds describe the unrotated shape, which is
//! what alignment and distribution operate on.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use crate::consts::{TEXT_CHAR_WIDTH_RATIO, TEXT_LINE_HEIGHT_RATIO};
use crate::shape::{Geometry, Shape, ShapePatch};

/// Axis-aligned bounding box in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Smallest box containing every input, or `None` for an empty input.
    pub fn enclosing<'a>(boxes: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(a) => Some(a.union(b)),
        })
    }
}

/// Estimated extent of a text block: widest line by glyph count, one line
/// height per line.
#[must_use]
pub fn text_extent(text: &str, font_size: f64) -> (f64, f64) {
    let lines = text.lines().count().max(1);
    let widest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
    #[allow(clippy::cast_precision_loss)]
    let (widest, lines) = (widest as f64, lines as f64);
    (widest * font_size * TEXT_CHAR_WIDTH_RATIO, lines * font_size * TEXT_LINE_HEIGHT_RATIO)
}

impl Shape {
    /// Unrotated bounding box.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        match &self.geometry {
            Geometry::Rectangle { x, y, width, height } => Bounds {
                min_x: x.min(x + width),
                min_y: y.min(y + height),
                max_x: x.max(x + width),
                max_y: y.max(y + height),
            },
            Geometry::Circle { x, y, radius } => {
                let r = radius.abs();
                Bounds { min_x: x - r, min_y: y - r, max_x: x + r, max_y: y + r }
            }
            Geometry::Text { x, y, text, font_size } => {
                let (w, h) = text_extent(text, *font_size);
                Bounds { min_x: *x, min_y: *y, max_x: x + w, max_y: y + h }
            }
        }
    }

    /// Geometric center.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        match &self.geometry {
            Geometry::Circle { x, y, .. } => (*x, *y),
            Geometry::Rectangle { .. } | Geometry::Text { .. } => self.bounds().center(),
        }
    }

    #[must_use]
    pub fn left(&self) -> f64 {
        self.bounds().min_x
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.bounds().max_x
    }

    #[must_use]
    pub fn top(&self) -> f64 {
        self.bounds().min_y
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.bounds().max_y
    }

    /// Patch that moves the shape by `(dx, dy)`.
    #[must_use]
    pub fn translation(&self, dx: f64, dy: f64) -> ShapePatch {
        let (x, y) = self.geometry.position();
        ShapePatch::default().with_position(x + dx, y + dy)
    }
}
