//! Panel geometry: positioning against an anchor, clamping to the visible
//! surface, and drag/resize gestures.
//!
//! Everything here is pure and infallible. Out-of-range inputs are clamped,
//! never rejected.

mod gesture;
mod position;

pub use gesture::{Gesture, GestureKind, GestureTracker};
pub use position::PositionEngine;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

impl Position {
    pub fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_parts(position: Position, size: Size) -> Self {
        Self::new(position.left, position.top, size.width, size.height)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn position(&self) -> Position {
        Position::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// An anchor with zero area is not currently rendered.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// The visible render area panels are clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub bounds: Rect,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, width, height),
        }
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(1280.0, 800.0)
    }
}

/// Size limits enforced while resizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeLimits {
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl SizeLimits {
    pub fn clamp(&self, size: Size) -> Size {
        Size::new(
            clamp_finite(size.width, self.min_width, self.max_width),
            clamp_finite(size.height, self.min_height, self.max_height),
        )
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            min_width: 280.0,
            max_width: 720.0,
            min_height: 160.0,
            max_height: 640.0,
        }
    }
}

/// Clamps `value` into `[min, max]`; a non-finite value maps to `min`.
///
/// When `max < min` the lower bound wins.
pub(crate) fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.min(max).max(min)
}
