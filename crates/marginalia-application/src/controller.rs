//! Per-panel controller.
//!
//! One `SessionController` exists per mounted panel. It owns the panel's
//! visibility state, hover flag, gesture capture and text size, and applies
//! geometry changes to the session it controls. The session itself stays in
//! the graph; every method that needs it takes it as an argument.

use marginalia_core::geometry::{
    GestureKind, GestureTracker, Position, PositionEngine, Rect, Size, SizeLimits, Surface,
};
use marginalia_core::host::PanelView;
use marginalia_core::panel::{PanelState, PanelStatus};
use marginalia_core::preference::{PreferenceStore, TextSize, load_text_size};
use marginalia_core::session::{Session, SessionId};

/// Geometry inputs shared by every panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelLayout {
    pub engine: PositionEngine,
    pub limits: SizeLimits,
    pub default_size: Size,
    pub surface: Surface,
}

#[derive(Debug)]
pub struct SessionController {
    session_id: SessionId,
    status: PanelStatus,
    gestures: GestureTracker,
    anchor: Rect,
    hovered: bool,
    text_size: TextSize,
    streaming_text: Option<String>,
}

impl SessionController {
    /// Creates a hidden controller; the text size is read from `preferences`.
    pub fn new(session_id: SessionId, anchor: Rect, preferences: &dyn PreferenceStore) -> Self {
        Self {
            session_id,
            status: PanelStatus::new(),
            gestures: GestureTracker::new(),
            anchor,
            hovered: false,
            text_size: load_text_size(preferences),
            streaming_text: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> PanelState {
        self.status.state()
    }

    pub fn is_visible(&self) -> bool {
        self.status.is_visible()
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gestures.is_active()
    }

    pub fn text_size(&self) -> TextSize {
        self.text_size
    }

    pub fn set_text_size(&mut self, text_size: TextSize) {
        self.text_size = text_size;
    }

    pub fn anchor(&self) -> Rect {
        self.anchor
    }

    /// Shows the panel and places it.
    ///
    /// Pinned or user-positioned sessions keep their geometry (clamped to the
    /// surface). Otherwise the panel is placed next to its anchor; an anchor
    /// without area leaves an existing position untouched.
    pub fn show(&mut self, session: &mut Session, layout: &PanelLayout) -> bool {
        if !self.status.transition(PanelState::Shown) {
            return false;
        }
        self.status.sync_pinned(session.is_pinned);

        let size = session
            .size
            .map(|s| layout.limits.clamp(s))
            .unwrap_or(layout.default_size);
        session.size = Some(size);

        let frozen = session.is_pinned || session.user_positioned;
        let position = match (frozen, session.position) {
            (true, Some(pos)) => Some(layout.engine.clamp_to_surface(
                pos.left,
                pos.top,
                size.width,
                size.height,
                &layout.surface,
            )),
            _ => layout
                .engine
                .position_relative_to(self.anchor, size, &layout.surface)
                .or(session.position),
        };

        session.position = Some(position.unwrap_or_else(|| {
            layout
                .engine
                .clamp_to_surface(0.0, 0.0, size.width, size.height, &layout.surface)
        }));
        true
    }

    /// Hides the panel and drops any in-progress gesture.
    pub fn hide(&mut self) {
        self.gestures.cancel();
        self.hovered = false;
        self.streaming_text = None;
        self.status.transition(PanelState::Hidden);
    }

    /// Focuses the panel (`Shown -> Active`).
    pub fn activate(&mut self) -> bool {
        self.status.transition(PanelState::Active)
    }

    /// Drops focus (`Active -> Shown`).
    pub fn deactivate(&mut self) -> bool {
        self.status.state() == PanelState::Active && self.status.transition(PanelState::Shown)
    }

    pub fn begin_request(&mut self) -> bool {
        let started = self.status.transition(PanelState::Streaming);
        if started {
            self.streaming_text = Some(String::new());
        }
        started
    }

    pub fn append_streaming_text(&mut self, text: &str) {
        if self.status.is_streaming() {
            self.streaming_text = Some(text.to_string());
        }
    }

    /// Request completed or failed (`Streaming -> Shown`).
    pub fn end_request(&mut self) -> bool {
        self.streaming_text = None;
        self.status.transition(PanelState::Shown)
    }

    /// Pins or unpins. Only takes effect while the panel is visible.
    pub fn set_pinned(&mut self, pinned: bool) -> bool {
        self.status.set_pinned(pinned)
    }

    pub fn sync_pinned(&mut self, pinned: bool) {
        self.status.sync_pinned(pinned);
    }

    pub fn pointer_enter(&mut self) {
        self.hovered = true;
    }

    pub fn pointer_leave(&mut self) {
        self.hovered = false;
    }

    /// Fire-time auto-close check: pinned, hovered, or mid-gesture.
    pub fn is_close_suppressed(&self, session: &Session) -> bool {
        session.is_pinned || self.hovered || self.gestures.is_active()
    }

    /// Moves the anchor and re-attaches the panel to it unless the geometry
    /// is frozen. Returns whether the panel moved.
    pub fn update_anchor(&mut self, anchor: Rect, session: &mut Session, layout: &PanelLayout) -> bool {
        self.anchor = anchor;
        if session.is_pinned || session.user_positioned || self.gestures.is_active() {
            return false;
        }
        let size = session.size.unwrap_or(layout.default_size);
        match layout
            .engine
            .position_relative_to(anchor, size, &layout.surface)
        {
            Some(position) if session.position != Some(position) => {
                session.position = Some(position);
                true
            }
            _ => false,
        }
    }

    /// Re-clamps the panel after the surface changed. Returns whether it moved.
    pub fn fit_to_surface(&mut self, session: &mut Session, layout: &PanelLayout) -> bool {
        let (Some(position), Some(size)) = (session.position, session.size) else {
            return false;
        };
        let clamped =
            layout
                .engine
                .clamp_to_surface(position.left, position.top, size.width, size.height, &layout.surface);
        if clamped == position {
            return false;
        }
        session.position = Some(clamped);
        true
    }

    /// Captures the pointer for a drag or resize.
    pub fn begin_gesture(
        &mut self,
        kind: GestureKind,
        pointer: Position,
        session: &Session,
        layout: &PanelLayout,
    ) {
        let size = session.size.unwrap_or(layout.default_size);
        let position = session.position.unwrap_or_default();
        self.gestures
            .start(kind, pointer, Rect::from_parts(position, size));
    }

    /// Applies a pointer move to the session geometry.
    pub fn update_gesture(
        &mut self,
        pointer: Position,
        session: &mut Session,
        layout: &PanelLayout,
    ) -> Option<Rect> {
        let rect = self
            .gestures
            .update(pointer, &layout.engine, &layout.limits, &layout.surface)?;
        session.position = Some(rect.position());
        session.size = Some(rect.size());
        Some(rect)
    }

    /// Releases the capture, persists the final geometry and marks the
    /// session as user-positioned.
    pub fn end_gesture(&mut self, session: &mut Session) -> Option<Rect> {
        let rect = self.gestures.end()?;
        session.position = Some(rect.position());
        session.size = Some(rect.size());
        session.user_positioned = true;
        Some(rect)
    }

    /// Releases pointer capture and hover without touching the session.
    pub fn release(&mut self) {
        self.gestures.cancel();
        self.hovered = false;
    }

    pub fn view(&self, session: &Session) -> PanelView {
        PanelView {
            session_id: session.id.clone(),
            subject: session.subject().to_string(),
            messages: session.messages.clone(),
            pill_status: session.pill_status.clone(),
            draft: session.draft.clone(),
            streaming_text: self.streaming_text.clone(),
            state: self.status.state(),
            pinned: session.is_pinned,
            position: session.position,
            size: session.size,
            z_index: session.target_z_index,
            nesting_level: session.nesting_level,
            text_size: self.text_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::preference::{PreferenceStore, TEXT_SIZE_KEY};
    use marginalia_core::Result;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, String>>);

    impl PreferenceStore for MapStore {
        fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn layout() -> PanelLayout {
        PanelLayout {
            engine: PositionEngine::new(8.0, 6.0),
            limits: SizeLimits::default(),
            default_size: Size::new(380.0, 260.0),
            surface: Surface::new(1280.0, 800.0),
        }
    }

    fn controller(session: &Session, anchor: Rect) -> SessionController {
        SessionController::new(session.id.clone(), anchor, &MapStore::default())
    }

    #[test]
    fn test_text_size_read_on_creation() {
        let store = MapStore::default();
        store.set(TEXT_SIZE_KEY, "large").unwrap();
        let session = Session::new("s", "");
        let c = SessionController::new(session.id.clone(), Rect::default(), &store);
        assert_eq!(c.text_size(), TextSize::Large);

        store.set(TEXT_SIZE_KEY, "bogus").unwrap();
        let c = SessionController::new(session.id.clone(), Rect::default(), &store);
        assert_eq!(c.text_size(), TextSize::Medium);
    }

    #[test]
    fn test_show_places_below_anchor() {
        let mut session = Session::new("s", "");
        let mut c = controller(&session, Rect::new(100.0, 100.0, 80.0, 20.0));
        assert!(c.show(&mut session, &layout()));
        assert_eq!(session.position, Some(Position::new(100.0, 126.0)));
        assert_eq!(session.size, Some(Size::new(380.0, 260.0)));
        assert_eq!(c.state(), PanelState::Shown);
    }

    #[test]
    fn test_show_with_zero_area_anchor_keeps_position() {
        let mut session = Session::new("s", "");
        session.position = Some(Position::new(300.0, 300.0));
        let mut c = controller(&session, Rect::new(50.0, 50.0, 0.0, 0.0));
        c.show(&mut session, &layout());
        assert_eq!(session.position, Some(Position::new(300.0, 300.0)));
    }

    #[test]
    fn test_gesture_end_marks_user_positioned() {
        let mut session = Session::new("s", "");
        let mut c = controller(&session, Rect::new(100.0, 100.0, 80.0, 20.0));
        let layout = layout();
        c.show(&mut session, &layout);

        c.begin_gesture(GestureKind::Drag, Position::new(110.0, 130.0), &session, &layout);
        assert!(c.is_gesture_active());
        assert!(c.is_close_suppressed(&session));
        c.update_gesture(Position::new(160.0, 180.0), &mut session, &layout);
        let rect = c.end_gesture(&mut session).unwrap();

        assert_eq!(rect.position(), Position::new(150.0, 176.0));
        assert!(session.user_positioned);
        assert!(!c.is_close_suppressed(&session));

        // Anchor moves no longer drag the panel along.
        assert!(!c.update_anchor(Rect::new(400.0, 400.0, 80.0, 20.0), &mut session, &layout));
        assert_eq!(session.position, Some(Position::new(150.0, 176.0)));
    }

    #[test]
    fn test_update_anchor_follows_unfrozen_panel() {
        let mut session = Session::new("s", "");
        let mut c = controller(&session, Rect::new(100.0, 100.0, 80.0, 20.0));
        let layout = layout();
        c.show(&mut session, &layout);

        assert!(c.update_anchor(Rect::new(100.0, 40.0, 80.0, 20.0), &mut session, &layout));
        assert_eq!(session.position, Some(Position::new(100.0, 66.0)));
        assert!(!c.update_anchor(Rect::new(0.0, 0.0, 0.0, 0.0), &mut session, &layout));
    }

    #[test]
    fn test_fit_to_surface_after_shrink() {
        let mut session = Session::new("s", "");
        let mut c = controller(&session, Rect::new(800.0, 500.0, 80.0, 20.0));
        let mut layout = layout();
        c.show(&mut session, &layout);

        layout.surface = Surface::new(600.0, 400.0);
        assert!(c.fit_to_surface(&mut session, &layout));
        assert_eq!(session.position, Some(Position::new(212.0, 132.0)));
        assert!(!c.fit_to_surface(&mut session, &layout));
    }

    #[test]
    fn test_request_cycle_and_streaming_text() {
        let mut session = Session::new("s", "");
        let mut c = controller(&session, Rect::new(10.0, 10.0, 10.0, 10.0));
        assert!(!c.begin_request(), "hidden panel cannot stream");
        c.show(&mut session, &layout());
        assert!(c.activate());
        assert!(c.begin_request());
        c.append_streaming_text("{\"pill");
        assert_eq!(c.view(&session).streaming_text.as_deref(), Some("{\"pill"));
        assert!(c.end_request());
        assert_eq!(c.view(&session).streaming_text, None);
        assert_eq!(c.state(), PanelState::Shown);
    }
}
