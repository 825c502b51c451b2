//! Session domain module.
//!
//! This module contains the annotation session model, its conversation
//! messages, and the structured result the assistant produces.
//!
//! # Module Structure
//!
//! - `model`: Core session entity (`Session`, `SessionId`)
//! - `message`: Conversation message types (`MessageRole`, `Message`)
//! - `result`: Structured assistant payload (`PillResult`, `ResultMode`) and pill status

mod message;
mod model;
mod result;

// Re-export public API
pub use message::{Message, MessageRole};
pub use model::{MAX_NESTING_LEVEL, RequestKind, Session, SessionId};
pub use result::{PillResult, PillStatus, ResultMode};
