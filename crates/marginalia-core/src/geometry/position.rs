use super::{Position, Rect, Size, Surface, clamp_finite};

/// Computes panel positions relative to anchors and keeps panels on-surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEngine {
    /// Distance kept between a panel and the surface edges.
    pub margin: f64,
    /// Distance between the anchor and the panel placed next to it.
    pub gap: f64,
}

impl Default for PositionEngine {
    fn default() -> Self {
        Self {
            margin: 8.0,
            gap: 6.0,
        }
    }
}

impl PositionEngine {
    pub fn new(margin: f64, gap: f64) -> Self {
        Self { margin, gap }
    }

    /// Clamps a rectangle so it stays inside the surface minus the margin.
    ///
    /// A rectangle larger than the surface is pinned to the margin-origin
    /// corner instead of being centered.
    pub fn clamp_to_surface(
        &self,
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        surface: &Surface,
    ) -> Position {
        let bounds = surface.bounds;
        let min_left = bounds.left + self.margin;
        let min_top = bounds.top + self.margin;
        let max_left = bounds.right() - self.margin - width;
        let max_top = bounds.bottom() - self.margin - height;

        Position::new(
            clamp_finite(left, min_left, max_left),
            clamp_finite(top, min_top, max_top),
        )
    }

    pub fn clamp_rect(&self, rect: Rect, surface: &Surface) -> Position {
        self.clamp_to_surface(rect.left, rect.top, rect.width, rect.height, surface)
    }

    /// Places a panel below the anchor, left-aligned, flipping above when it
    /// would overflow the bottom and shifting left when it would overflow the
    /// right.
    ///
    /// Returns `None` when the anchor has no area; callers keep the panel
    /// where it is in that case.
    pub fn position_relative_to(
        &self,
        anchor: Rect,
        panel: Size,
        surface: &Surface,
    ) -> Option<Position> {
        if !anchor.has_area() {
            return None;
        }

        let bounds = surface.bounds;
        let mut left = anchor.left;
        let mut top = anchor.bottom() + self.gap;

        if top + panel.height > bounds.bottom() - self.margin {
            top = anchor.top - self.gap - panel.height;
        }

        if left + panel.width > bounds.right() - self.margin {
            left = (bounds.right() - self.margin - panel.width).max(bounds.left + self.margin);
        }

        Some(self.clamp_to_surface(left, top, panel.width, panel.height, surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PositionEngine {
        PositionEngine::new(8.0, 6.0)
    }

    #[test]
    fn test_clamp_keeps_inside_rect_unchanged() {
        let surface = Surface::new(1000.0, 800.0);
        let pos = engine().clamp_to_surface(100.0, 120.0, 300.0, 200.0, &surface);
        assert_eq!(pos, Position::new(100.0, 120.0));
    }

    #[test]
    fn test_clamp_pulls_overflow_back_within_margin() {
        let surface = Surface::new(1000.0, 800.0);
        let pos = engine().clamp_to_surface(900.0, -50.0, 300.0, 200.0, &surface);
        assert_eq!(pos, Position::new(692.0, 8.0));
    }

    #[test]
    fn test_clamp_oversized_rect_pins_to_margin_origin() {
        let surface = Surface::new(400.0, 300.0);
        let pos = engine().clamp_to_surface(120.0, 90.0, 800.0, 900.0, &surface);
        assert_eq!(pos, Position::new(8.0, 8.0));
    }

    #[test]
    fn test_clamp_non_finite_inputs() {
        let surface = Surface::new(400.0, 300.0);
        let pos = engine().clamp_to_surface(f64::NAN, f64::INFINITY, 100.0, 100.0, &surface);
        assert_eq!(pos, Position::new(8.0, 8.0));
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let surface = Surface {
            bounds: Rect::new(-20.0, 40.0, 640.0, 480.0),
        };
        let e = engine();
        let samples = [
            (-500.0, -500.0, 100.0, 80.0),
            (300.0, 200.0, 100.0, 80.0),
            (10_000.0, 10_000.0, 100.0, 80.0),
            (50.0, 50.0, 2_000.0, 10.0),
            (f64::NAN, 12.0, 700.0, 700.0),
            (0.0, 0.0, 0.0, 0.0),
        ];
        for (x, y, w, h) in samples {
            let once = e.clamp_to_surface(x, y, w, h, &surface);
            let twice = e.clamp_to_surface(once.left, once.top, w, h, &surface);
            assert_eq!(once, twice, "input ({x}, {y}, {w}, {h})");
        }
    }

    #[test]
    fn test_position_below_anchor() {
        let surface = Surface::new(1000.0, 800.0);
        let anchor = Rect::new(100.0, 100.0, 80.0, 20.0);
        let pos = engine()
            .position_relative_to(anchor, Size::new(300.0, 200.0), &surface)
            .unwrap();
        assert_eq!(pos, Position::new(100.0, 126.0));
    }

    #[test]
    fn test_position_flips_above_when_bottom_overflows() {
        let surface = Surface::new(1000.0, 800.0);
        let anchor = Rect::new(100.0, 700.0, 80.0, 20.0);
        let pos = engine()
            .position_relative_to(anchor, Size::new(300.0, 200.0), &surface)
            .unwrap();
        assert_eq!(pos, Position::new(100.0, 494.0));
    }

    #[test]
    fn test_position_shifts_left_when_right_overflows() {
        let surface = Surface::new(1000.0, 800.0);
        let anchor = Rect::new(900.0, 100.0, 60.0, 20.0);
        let pos = engine()
            .position_relative_to(anchor, Size::new(300.0, 200.0), &surface)
            .unwrap();
        assert_eq!(pos, Position::new(692.0, 126.0));
    }

    #[test]
    fn test_position_zero_area_anchor_is_noop() {
        let surface = Surface::new(1000.0, 800.0);
        let anchor = Rect::new(100.0, 100.0, 0.0, 20.0);
        assert!(
            engine()
                .position_relative_to(anchor, Size::new(300.0, 200.0), &surface)
                .is_none()
        );
    }
}
