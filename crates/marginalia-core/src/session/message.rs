//! Conversation message types.

use super::result::PillResult;
use serde::{Deserialize, Serialize};

/// Represents the role of a message in a session thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the user (or the selection that started the session).
    User,
    /// Message produced by the streaming endpoint, or a request error.
    Assistant,
}

/// A single message in a session thread.
///
/// Assistant messages carry the structured payload they were rendered from in
/// `display_payload`; error messages and user messages leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_payload: Option<PillResult>,
    /// Timestamp when the message was created (RFC 3339).
    pub timestamp: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            display_payload: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Creates an assistant message rendered from a structured result.
    pub fn assistant(result: PillResult) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: result.display_text(),
            display_payload: Some(result),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Creates an assistant message that records a failed request.
    pub fn assistant_error(error_text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: error_text.into(),
            display_payload: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}
