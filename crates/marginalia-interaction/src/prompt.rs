//! Request body sent to `{backend_url}/api/stream`.

use marginalia_core::session::{MessageRole, Session};
use marginalia_core::settings::Settings;
use serde::{Deserialize, Serialize};

/// Instructions sent as `options.system` with every request.
pub const SYSTEM_PROMPT: &str = r#"You annotate text that a reader selected on a web page.
Reply with exactly one JSON object and nothing else:
{"pillText": string, "mode": "inline" | "reference", "explanation"?: string, "url"?: string}
Rules:
- pillText is a short label of fewer than 45 characters.
- Use mode "inline" with an explanation for definitions and clarifications.
- Use mode "reference" with a url when the best answer is an external source.
- Use double-quoted keys and strings only. No code fences, no commentary."#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub messages: Vec<WireMessage>,
    pub options: RequestOptions,
}

/// First user message of a session.
pub fn initial_user_message(subject: &str) -> String {
    format!("Explain \"{}\" in the context of this page.", subject.trim())
}

/// Builds the request for the session's current thread.
///
/// Assistant messages that only record a failed request are left out.
pub fn build_request(session: &Session, context: &str, settings: &Settings) -> StreamRequest {
    let messages = session
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User || m.display_payload.is_some())
        .map(|m| WireMessage {
            role: m.role,
            content: match (&m.role, &m.display_payload) {
                (MessageRole::Assistant, Some(payload)) => {
                    serde_json::to_string(payload).unwrap_or_else(|_| m.content.clone())
                }
                _ => m.content.clone(),
            },
        })
        .collect();

    let system = if context.trim().is_empty() {
        SYSTEM_PROMPT.to_string()
    } else {
        format!("{SYSTEM_PROMPT}\n\nPage context:\n{context}")
    };

    StreamRequest {
        messages,
        options: RequestOptions {
            system,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        },
    }
}
