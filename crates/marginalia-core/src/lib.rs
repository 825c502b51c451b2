//! Core domain of Marginalia: sessions, the session tree, stacking order,
//! panel geometry, and auto-close timers.

pub mod error;
pub mod geometry;
pub mod graph;
pub mod host;
pub mod panel;
pub mod preference;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod stacking;

// Re-export common error type
pub use error::{MarginaliaError, Result};
