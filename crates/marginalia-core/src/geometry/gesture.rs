use super::{Position, PositionEngine, Rect, Size, SizeLimits, Surface};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Drag,
    /// Resize from the bottom-right handle.
    Resize,
}

/// An in-progress drag or resize, captured on `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gesture {
    pub kind: GestureKind,
    pub origin_pointer: Position,
    pub origin: Rect,
    pub current: Rect,
}

/// Tracks the three-phase `start` / `move*` / `end` gesture of one panel.
///
/// Each move is computed from the cumulative pointer delta against the
/// geometry captured at `start`, so dropped intermediate moves never drift.
#[derive(Debug, Default)]
pub struct GestureTracker {
    active: Option<Gesture>,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Gesture> {
        self.active.as_ref()
    }

    /// Captures the pointer and the originating panel geometry.
    ///
    /// A second `start` while a gesture is active replaces it.
    pub fn start(&mut self, kind: GestureKind, pointer: Position, origin: Rect) {
        self.active = Some(Gesture {
            kind,
            origin_pointer: pointer,
            origin,
            current: origin,
        });
    }

    /// Applies a pointer move. Returns the new geometry, or `None` when no
    /// gesture is active.
    pub fn update(
        &mut self,
        pointer: Position,
        engine: &PositionEngine,
        limits: &SizeLimits,
        surface: &Surface,
    ) -> Option<Rect> {
        let gesture = self.active.as_mut()?;
        let dx = pointer.left - gesture.origin_pointer.left;
        let dy = pointer.top - gesture.origin_pointer.top;
        let origin = gesture.origin;

        let next = match gesture.kind {
            GestureKind::Drag => {
                let pos = engine.clamp_to_surface(
                    origin.left + dx,
                    origin.top + dy,
                    origin.width,
                    origin.height,
                    surface,
                );
                Rect::from_parts(pos, origin.size())
            }
            GestureKind::Resize => {
                let size = limits.clamp(Size::new(origin.width + dx, origin.height + dy));
                let pos =
                    engine.clamp_to_surface(origin.left, origin.top, size.width, size.height, surface);
                Rect::from_parts(pos, size)
            }
        };

        gesture.current = next;
        Some(next)
    }

    /// Releases the capture and returns the final geometry.
    pub fn end(&mut self) -> Option<Rect> {
        self.active.take().map(|g| g.current)
    }

    /// Drops an active gesture without reporting geometry.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}
