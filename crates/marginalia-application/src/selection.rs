//! Inputs and outcomes of the orchestrator's entry points.

use marginalia_core::geometry::Rect;
use marginalia_core::host::PageSnapshot;
use marginalia_core::session::{PillResult, SessionId};
use serde::{Deserialize, Serialize};

/// A confirmed text selection on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub text: String,
    /// Bounding rectangle of the selected range.
    pub anchor: Rect,
    /// Session whose panel content contains the selection, if any.
    pub container: Option<SessionId>,
    pub page: PageSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Created(SessionId),
    /// Nesting under `parent` would exceed the depth limit. The host offers
    /// the non-nested fallback (`confirm_selection_unnested`).
    NestingLimitReached { parent: SessionId, level: u8 },
    /// Empty selection, or nothing to confirm.
    Ignored,
}

impl SelectionOutcome {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SelectionOutcome::Created(id) => Some(id),
            _ => None,
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed(PillResult),
    /// Recorded on the session as an assistant error message.
    Failed(String),
    /// The session was closed while the request was in flight.
    Discarded,
    /// Nothing to send (empty message).
    Ignored,
}

/// A pre-computed annotation the host asks to display without a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HypertextInstruction {
    pub subject: String,
    pub anchor: Rect,
    pub result: PillResult,
}
