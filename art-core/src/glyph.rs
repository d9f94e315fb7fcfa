//! Glyphs - the text/emoji labels placed on top of the background.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a glyph on a live canvas.
///
/// Ids are runtime only; they are never written to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlyphId(Uuid);

impl GlyphId {
    /// Create a new unique glyph ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GlyphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GlyphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in canvas space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset this point by `delta`, saturating at the integer bounds.
    #[must_use]
    pub const fn offset_by(self, delta: Self) -> Self {
        Self {
            x: self.x.saturating_add(delta.x),
            y: self.y.saturating_add(delta.y),
        }
    }
}

/// A placed glyph as it appears in a document.
///
/// `x`/`y` are the glyph's center in canvas space and `size` is its point size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlyphPlacement {
    /// Center X.
    pub x: i32,
    /// Center Y.
    pub y: i32,
    /// The glyph text, usually a single emoji.
    pub text: String,
    /// Point size.
    pub size: i32,
}

impl GlyphPlacement {
    /// Create a placement centered at `center`.
    #[must_use]
    pub fn new(text: impl Into<String>, size: i32, center: Point) -> Self {
        Self {
            x: center.x,
            y: center.y,
            text: text.into(),
            size,
        }
    }

    /// Center of the glyph.
    #[must_use]
    pub const fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A live glyph on the canvas: a placement plus its runtime identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    /// Runtime identifier.
    pub id: GlyphId,
    /// Current placement.
    pub placement: GlyphPlacement,
}

impl Glyph {
    /// Wrap a placement with a fresh id.
    #[must_use]
    pub fn new(placement: GlyphPlacement) -> Self {
        Self {
            id: GlyphId::new(),
            placement,
        }
    }

    /// Scale the point size by `factor`, rounding to the nearest point and never below 1.
    ///
    /// Returns the new size.
    #[allow(clippy::cast_possible_truncation)] // clamped to i32 range before the cast
    pub fn scale(&mut self, factor: f64) -> i32 {
        let scaled = (f64::from(self.placement.size) * factor)
            .round()
            .clamp(1.0, f64::from(i32::MAX));
        self.placement.size = scaled as i32;
        self.placement.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_saturates() {
        let p = Point::new(i32::MAX - 1, 0).offset_by(Point::new(10, -5));
        assert_eq!(p, Point::new(i32::MAX, -5));
    }

    #[test]
    fn test_scale_rounds_and_clamps() {
        let mut glyph = Glyph::new(GlyphPlacement::new("🐶", 40, Point::new(0, 0)));
        assert_eq!(glyph.scale(1.26), 50);
        assert_eq!(glyph.scale(0.001), 1);
        assert_eq!(glyph.scale(2.0), 2);
    }

    #[test]
    fn test_placement_json_shape() {
        let placement = GlyphPlacement::new("🦊", 24, Point::new(3, 4));
        let json = serde_json::to_value(&placement).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"x": 3, "y": 4, "text": "🦊", "size": 24})
        );
    }
}
