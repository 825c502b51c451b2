//! Talking to the streaming completion endpoint: request construction, the
//! chunked transport, page context, and recovery of the structured result
//! from streamed text.

pub mod context;
pub mod endpoint;
pub mod parser;
pub mod prompt;

pub use context::{default_context, resolve_context};
pub use endpoint::{FrameStream, HttpStreamingEndpoint, StreamingEndpoint};
pub use parser::{StreamingResponseParser, extract_result};
pub use prompt::{
    RequestOptions, SYSTEM_PROMPT, StreamRequest, WireMessage, build_request, initial_user_message,
};
