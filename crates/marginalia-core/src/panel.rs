//! Panel visibility state machine.
//!
//! ```text
//! Hidden -> Shown -> {Active, Streaming} -> Hidden
//! ```
//!
//! `pinned` is an overlay on any non-hidden state: it disables auto-close and
//! freezes the geometry used on the next show.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelState {
    #[default]
    Hidden,
    Shown,
    /// Shown and focused by the user (composer or pointer interaction).
    Active,
    /// Shown with a request in flight.
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PanelStatus {
    state: PanelState,
    pinned: bool,
}

impl PanelStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state != PanelState::Hidden
    }

    pub fn is_streaming(&self) -> bool {
        self.state == PanelState::Streaming
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Attempts a transition; illegal transitions leave the state unchanged.
    pub fn transition(&mut self, to: PanelState) -> bool {
        use PanelState::*;
        let allowed = matches!(
            (self.state, to),
            (Hidden, Shown)
                | (Shown, Active)
                | (Active, Shown)
                | (Shown, Streaming)
                | (Active, Streaming)
                | (Streaming, Shown)
                | (Shown, Hidden)
                | (Active, Hidden)
                | (Streaming, Hidden)
        );
        if allowed {
            self.state = to;
        } else if self.state != to {
            tracing::debug!("[Panel] Ignored transition {:?} -> {:?}", self.state, to);
        }
        allowed
    }

    /// Sets the pin overlay. Only a visible panel can change its pin.
    pub fn set_pinned(&mut self, pinned: bool) -> bool {
        if !self.is_visible() {
            return false;
        }
        self.pinned = pinned;
        true
    }

    /// Syncs the overlay from the session without the visibility check, used
    /// when a pin is applied by the graph (e.g. auto-pin of a parent).
    pub fn sync_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }
}
