//! Error types for the Marginalia workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for every Marginalia crate.
///
/// Request-path variants (`MalformedResponse`, `TransportFailure`) are caught
/// at the orchestrator boundary and turned into assistant messages; they never
/// propagate to the host. Geometry and stacking code never produces errors.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum MarginaliaError {
    /// Session creation refused because the parent is already at the depth cap
    #[error("Nesting limit exceeded: level {level} (limit {limit})")]
    NestingLimitExceeded { level: u8, limit: u8 },

    /// Streamed output could not be recovered into a structured result
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Non-2xx status or network failure from the streaming endpoint
    #[error("Transport failure{}: {message}", status_suffix(.status))]
    TransportFailure { status: Option<u16>, message: String },

    /// A result arrived for a session that is no longer in the graph
    #[error("Stale session write: {session_id}")]
    StaleSessionWrite { session_id: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Non-forced close refused because the session is pinned
    #[error("Session '{session_id}' is pinned")]
    SessionPinned { session_id: String },

    /// A request is already in flight for the session
    #[error("Session '{session_id}' already has a request in flight")]
    SessionBusy { session_id: String },

    /// Non-cascading detach of a session that still owns children
    #[error("Session '{session_id}' still has child sessions")]
    HasChildren { session_id: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl MarginaliaError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a MalformedResponse error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Creates a TransportFailure error
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransportFailure {
            status,
            message: message.into(),
        }
    }

    /// Creates a StaleSessionWrite error
    pub fn stale(session_id: impl Into<String>) -> Self {
        Self::StaleSessionWrite {
            session_id: session_id.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a NestingLimitExceeded error
    pub fn is_nesting_limit(&self) -> bool {
        matches!(self, Self::NestingLimitExceeded { .. })
    }

    /// Check if this is a StaleSessionWrite error
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleSessionWrite { .. })
    }

    /// Returns true for failures of the request path.
    ///
    /// These are recorded on the session as an assistant error message and are
    /// recoverable by regenerating.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::TransportFailure { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for MarginaliaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for MarginaliaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for MarginaliaError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for MarginaliaError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for MarginaliaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, MarginaliaError>`.
pub type Result<T> = std::result::Result<T, MarginaliaError>;
