//! Structured assistant payload.

use serde::{Deserialize, Serialize};

/// How the result is presented next to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
    /// Short explanation shown inline in the panel.
    #[default]
    Inline,
    /// Pointer to an external reference (`url`).
    Reference,
}

/// The structured object the endpoint is instructed to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PillResult {
    pub pill_text: String,
    #[serde(default)]
    pub mode: ResultMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PillResult {
    pub fn inline(pill_text: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            pill_text: pill_text.into(),
            mode: ResultMode::Inline,
            explanation: Some(explanation.into()),
            url: None,
        }
    }

    /// Text used for the assistant message content.
    pub fn display_text(&self) -> String {
        match (&self.explanation, &self.url) {
            (Some(explanation), Some(url)) => format!("{explanation}\n\n{url}"),
            (Some(explanation), None) => explanation.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) => self.pill_text.clone(),
        }
    }
}

/// State of the pill rendered on the page anchor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PillStatus {
    #[default]
    Loading,
    Ready,
    /// The last request failed; `tooltip` carries the error text.
    Error { tooltip: String },
}
