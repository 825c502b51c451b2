//! Collaborators supplied by the host page.

use crate::error::Result;
use crate::geometry::{Position, Size};
use crate::panel::PanelState;
use crate::preference::TextSize;
use crate::session::{Message, PillStatus, Session, SessionId};
use serde::{Deserialize, Serialize};

/// Snapshot of the panel handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub session_id: SessionId,
    pub subject: String,
    pub messages: Vec<Message>,
    pub pill_status: PillStatus,
    pub draft: String,
    /// Partial response text while a request is streaming.
    pub streaming_text: Option<String>,
    pub state: PanelState,
    pub pinned: bool,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub z_index: Option<i64>,
    pub nesting_level: u8,
    pub text_size: TextSize,
}

/// Turns panel views into markup. Implemented by the host.
pub trait PanelRenderer: Send + Sync {
    fn render(&self, view: &PanelView);
    fn unmount(&self, session_id: &SessionId);
}

/// Page information captured when a selection is confirmed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub selection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub truncate_context: bool,
}

/// Optional host hook that supplies page context for a session.
pub trait ContextProvider: Send + Sync {
    fn provide(&self, session: &Session, options: ContextOptions) -> Result<String>;
}
