//! Shape model: the tagged geometry union, provenance metadata, and the
//! sparse patch type shared by local edits, remote writes, and history.
//!
//! A shape's `id` never changes; only field values do. Geometry-specific
//! fields are reached through exhaustive matches on [`Geometry`], so a patch
//! carrying `radius` simply does nothing to a rectangle.

#[cfg(test)]
#[path = "shape_test.rs"]
mod shape_test;

#[cfg(test)]
#[path = "shape_helpers_test.rs"]
pub mod test_helpers;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Globally unique shape identifier, assigned client-side at creation.
pub type ShapeId = Uuid;

/// Identifier of a collaborating client (lock holder, author).
pub type ClientId = Uuid;

// =============================================================================
// GEOMETRY
// =============================================================================

/// Variant-specific geometry. `x`/`y` is the top-left corner for rectangles
/// and text, and the center for circles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Rectangle { x: f64, y: f64, width: f64, height: f64 },
    Circle { x: f64, y: f64, radius: f64 },
    Text { x: f64, y: f64, text: String, font_size: f64 },
}

impl Geometry {
    /// Anchor position of the shape.
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        match self {
            Self::Rectangle { x, y, .. } | Self::Circle { x, y, .. } | Self::Text { x, y, .. } => (*x, *y),
        }
    }

    /// Lowercase variant name, used in logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Rectangle { .. } => "rectangle",
            Self::Circle { .. } => "circle",
            Self::Text { .. } => "text",
        }
    }
}

// =============================================================================
// SHAPE
// =============================================================================

/// A canvas object as stored locally and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    #[serde(flatten)]
    pub geometry: Geometry,
    /// CSS color string.
    pub color: String,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotation: f64,
    /// Draw order; lower values are drawn beneath higher values.
    pub z_index: i64,
    pub created_by: ClientId,
    pub created_at: i64,
    pub last_modified_by: ClientId,
    /// Timestamp compared by last-write-wins.
    pub last_modified_at: i64,
    /// Current lease holder, if any.
    #[serde(default)]
    pub locked_by: Option<ClientId>,
    /// When the current lease was granted.
    #[serde(default)]
    pub locked_at: Option<i64>,
}

/// Who wrote a change and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub by: ClientId,
    pub at: i64,
}

impl Shape {
    /// Build a fresh, unlocked shape authored by `stamp.by`.
    #[must_use]
    pub fn new(geometry: Geometry, color: impl Into<String>, z_index: i64, stamp: Stamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry,
            color: color.into(),
            rotation: 0.0,
            z_index,
            created_by: stamp.by,
            created_at: stamp.at,
            last_modified_by: stamp.by,
            last_modified_at: stamp.at,
            locked_by: None,
            locked_at: None,
        }
    }

    /// Apply every present field of `patch`. Fields that do not exist on this
    /// variant are ignored.
    pub fn apply(&mut self, patch: &ShapePatch) {
        match &mut self.geometry {
            Geometry::Rectangle { x, y, width, height } => {
                set(x, patch.x);
                set(y, patch.y);
                set(width, patch.width);
                set(height, patch.height);
            }
            Geometry::Circle { x, y, radius } => {
                set(x, patch.x);
                set(y, patch.y);
                set(radius, patch.radius);
            }
            Geometry::Text { x, y, text, font_size } => {
                set(x, patch.x);
                set(y, patch.y);
                set(font_size, patch.font_size);
                if let Some(t) = &patch.text {
                    text.clone_from(t);
                }
            }
        }
        if let Some(c) = &patch.color {
            self.color.clone_from(c);
        }
        set(&mut self.rotation, patch.rotation);
        set(&mut self.z_index, patch.z_index);
        set(&mut self.last_modified_by, patch.last_modified_by);
        set(&mut self.last_modified_at, patch.last_modified_at);
        set(&mut self.locked_by, patch.locked_by);
        set(&mut self.locked_at, patch.locked_at);
    }

    /// Current values of exactly the fields `patch` touches, so that applying
    /// the result undoes `patch`. Fields this variant lacks are left out.
    #[must_use]
    pub fn capture(&self, patch: &ShapePatch) -> ShapePatch {
        let mut out = ShapePatch::default();
        match &self.geometry {
            Geometry::Rectangle { x, y, width, height } => {
                out.x = patch.x.map(|_| *x);
                out.y = patch.y.map(|_| *y);
                out.width = patch.width.map(|_| *width);
                out.height = patch.height.map(|_| *height);
            }
            Geometry::Circle { x, y, radius } => {
                out.x = patch.x.map(|_| *x);
                out.y = patch.y.map(|_| *y);
                out.radius = patch.radius.map(|_| *radius);
            }
            Geometry::Text { x, y, text, font_size } => {
                out.x = patch.x.map(|_| *x);
                out.y = patch.y.map(|_| *y);
                out.text = patch.text.as_ref().map(|_| text.clone());
                out.font_size = patch.font_size.map(|_| *font_size);
            }
        }
        out.color = patch.color.as_ref().map(|_| self.color.clone());
        out.rotation = patch.rotation.map(|_| self.rotation);
        out.z_index = patch.z_index.map(|_| self.z_index);
        out.last_modified_by = patch.last_modified_by.map(|_| self.last_modified_by);
        out.last_modified_at = patch.last_modified_at.map(|_| self.last_modified_at);
        out.locked_by = patch.locked_by.map(|_| self.locked_by);
        out.locked_at = patch.locked_at.map(|_| self.locked_at);
        out
    }
}

fn set<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

// =============================================================================
// PATCH
// =============================================================================

/// Sparse update for a shape. Only present fields are applied or sent.
///
/// Lock fields are double options: `Some(None)` clears the lease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub locked_by: Option<Option<ClientId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub locked_at: Option<Option<i64>>,
}

impl ShapePatch {
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = Some(font_size);
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    #[must_use]
    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Set the lease fields; `None` releases.
    #[must_use]
    pub fn with_lock(mut self, holder: Option<ClientId>, at: Option<i64>) -> Self {
        self.locked_by = Some(holder);
        self.locked_at = Some(at);
        self
    }

    /// Set provenance fields for a write made at `stamp`.
    #[must_use]
    pub fn stamped(mut self, stamp: Stamp) -> Self {
        self.last_modified_by = Some(stamp.by);
        self.last_modified_at = Some(stamp.at);
        self
    }

    /// The user-visible fields only: provenance and lease fields stripped.
    /// This is what history records.
    #[must_use]
    pub fn content(&self) -> Self {
        Self { last_modified_by: None, last_modified_at: None, locked_by: None, locked_at: None, ..self.clone() }
    }

    /// True when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the present fields, provenance excluded.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.clone().retain_fields(|name| {
            names.push(name);
            true
        });
        names
    }

    /// Drop every present field for which `keep` returns false. Provenance
    /// fields are not offered to `keep`.
    pub fn retain_fields(&mut self, mut keep: impl FnMut(&'static str) -> bool) {
        retain_field(&mut self.x, "x", &mut keep);
        retain_field(&mut self.y, "y", &mut keep);
        retain_field(&mut self.width, "width", &mut keep);
        retain_field(&mut self.height, "height", &mut keep);
        retain_field(&mut self.radius, "radius", &mut keep);
        retain_field(&mut self.text, "text", &mut keep);
        retain_field(&mut self.font_size, "font_size", &mut keep);
        retain_field(&mut self.color, "color", &mut keep);
        retain_field(&mut self.rotation, "rotation", &mut keep);
        retain_field(&mut self.z_index, "z_index", &mut keep);
        retain_field(&mut self.locked_by, "locked_by", &mut keep);
        retain_field(&mut self.locked_at, "locked_at", &mut keep);
    }

    /// Copy every field present in `other` over this patch.
    pub fn overlay(&mut self, other: &ShapePatch) {
        overlay_field(&mut self.x, &other.x);
        overlay_field(&mut self.y, &other.y);
        overlay_field(&mut self.width, &other.width);
        overlay_field(&mut self.height, &other.height);
        overlay_field(&mut self.radius, &other.radius);
        overlay_field(&mut self.text, &other.text);
        overlay_field(&mut self.font_size, &other.font_size);
        overlay_field(&mut self.color, &other.color);
        overlay_field(&mut self.rotation, &other.rotation);
        overlay_field(&mut self.z_index, &other.z_index);
        overlay_field(&mut self.last_modified_by, &other.last_modified_by);
        overlay_field(&mut self.last_modified_at, &other.last_modified_at);
        overlay_field(&mut self.locked_by, &other.locked_by);
        overlay_field(&mut self.locked_at, &other.locked_at);
    }

    /// Fill fields absent here from `other`; fields already present are kept.
    pub fn fill_missing(&mut self, other: &ShapePatch) {
        fill_field(&mut self.x, &other.x);
        fill_field(&mut self.y, &other.y);
        fill_field(&mut self.width, &other.width);
        fill_field(&mut self.height, &other.height);
        fill_field(&mut self.radius, &other.radius);
        fill_field(&mut self.text, &other.text);
        fill_field(&mut self.font_size, &other.font_size);
        fill_field(&mut self.color, &other.color);
        fill_field(&mut self.rotation, &other.rotation);
        fill_field(&mut self.z_index, &other.z_index);
        fill_field(&mut self.last_modified_by, &other.last_modified_by);
        fill_field(&mut self.last_modified_at, &other.last_modified_at);
        fill_field(&mut self.locked_by, &other.locked_by);
        fill_field(&mut self.locked_at, &other.locked_at);
    }
}

fn overlay_field<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn retain_field<T>(slot: &mut Option<T>, name: &'static str, keep: &mut impl FnMut(&'static str) -> bool) {
    if slot.is_some() && !keep(name) {
        *slot = None;
    }
}

fn fill_field<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// Distinguish an explicit `null` (clear) from an absent key (leave alone).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
