//! Session domain model.
//!
//! A `Session` is one annotation thread anchored to a page selection. Sessions
//! live in an arena (`SessionGraph`) keyed by `SessionId`; the parent link is a
//! lookup-only id and the child list is owned by the parent.

use super::message::Message;
use super::result::{PillResult, PillStatus};
use crate::geometry::{Position, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sessions may nest at levels `0..MAX_NESTING_LEVEL`.
pub const MAX_NESTING_LEVEL: u8 = 5;

/// Opaque unique session identifier (UUID v4 format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which request produced (or will produce) the next assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// The first request, issued when the selection is confirmed.
    Initial,
    /// A user-typed message from the panel composer.
    FollowUp,
    /// Re-issue of the last user content after dropping the last answer.
    Regenerate,
}

/// One annotation/chat thread.
///
/// `subject` and `context` are captured at creation and never change.
/// `messages` is append-only and trimmed from the front to the configured
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    subject: String,
    context: String,
    pub messages: Vec<Message>,
    pub last_result: Option<PillResult>,
    pub pill_status: PillStatus,
    pub is_streaming: bool,
    pub is_pinned: bool,
    /// Uncommitted composer text, cleared on send.
    pub draft: String,
    pub position: Option<Position>,
    pub size: Option<Size>,
    /// Geometry was placed by a drag/resize and must not be auto-repositioned.
    pub user_positioned: bool,
    pub parent_session_id: Option<SessionId>,
    pub child_session_ids: Vec<SessionId>,
    pub nesting_level: u8,
    pub target_z_index: Option<i64>,
    /// Counter value of the last bring-to-front; breaks z ties.
    pub front_seq: u64,
    /// Pin state before this session was auto-pinned to host a child.
    pub auto_pinned_for_child: Option<bool>,
    /// The initial request has completed successfully at least once.
    pub has_completed_initial: bool,
    pub created_at: String,
}

impl Session {
    pub fn new(subject: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            subject: subject.into(),
            context: context.into(),
            messages: Vec::new(),
            last_result: None,
            pill_status: PillStatus::Loading,
            is_streaming: false,
            is_pinned: false,
            draft: String::new(),
            position: None,
            size: None,
            user_positioned: false,
            parent_session_id: None,
            child_session_ids: Vec::new(),
            nesting_level: 0,
            target_z_index: None,
            front_seq: 0,
            auto_pinned_for_child: None,
            has_completed_initial: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Sets the page context captured at creation.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_root(&self) -> bool {
        self.parent_session_id.is_none()
    }

    /// Appends a message and trims the oldest ones beyond `window`.
    pub fn push_message(&mut self, message: Message, window: usize) {
        self.messages.push(message);
        if window > 0 && self.messages.len() > window {
            let excess = self.messages.len() - window;
            self.messages.drain(..excess);
        }
    }

    /// Removes the most recent message if it is an assistant message.
    pub fn pop_last_assistant(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(message) if message.is_assistant() => self.messages.pop(),
            _ => None,
        }
    }

    /// Content of the most recent user message.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| !m.is_assistant())
            .map(|m| m.content.as_str())
    }

    /// Records a successful structured result.
    pub fn record_result(&mut self, result: PillResult, window: usize) {
        self.push_message(Message::assistant(result.clone()), window);
        self.last_result = Some(result);
        self.pill_status = PillStatus::Ready;
    }

    /// Records a failed request as an assistant error message.
    pub fn record_error(&mut self, error_text: &str, window: usize) {
        self.push_message(Message::assistant_error(error_text), window);
        self.pill_status = PillStatus::Error {
            tooltip: error_text.to_string(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageRole;

    #[test]
    fn test_new_session_is_root() {
        let session = Session::new("entropy", "page text");
        assert!(session.is_root());
        assert_eq!(session.nesting_level, 0);
        assert_eq!(session.subject(), "entropy");
        assert_eq!(session.context(), "page text");
        assert_eq!(session.pill_status, PillStatus::Loading);
    }

    #[test]
    fn test_push_message_trims_from_front() {
        let mut session = Session::new("s", "");
        for i in 0..7 {
            session.push_message(Message::user(format!("m{i}")), 5);
        }
        assert_eq!(session.messages.len(), 5);
        assert_eq!(session.messages[0].content, "m2");
        assert_eq!(session.messages[4].content, "m6");
    }

    #[test]
    fn test_pop_last_assistant_only_removes_assistant() {
        let mut session = Session::new("s", "");
        session.push_message(Message::user("question"), 50);
        assert!(session.pop_last_assistant().is_none());

        session.record_result(PillResult::inline("X", "Y"), 50);
        let popped = session.pop_last_assistant().unwrap();
        assert_eq!(popped.role, MessageRole::Assistant);
        assert_eq!(session.last_user_content(), Some("question"));
    }

    #[test]
    fn test_record_error_marks_pill() {
        let mut session = Session::new("s", "");
        session.record_error("Malformed response: empty", 50);
        assert_eq!(
            session.pill_status,
            PillStatus::Error {
                tooltip: "Malformed response: empty".to_string()
            }
        );
        assert!(session.messages[0].is_assistant());
    }
}
