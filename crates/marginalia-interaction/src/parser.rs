//! Streaming response parser.
//!
//! Frames arrive from the chunked transport in delivery order. They are split
//! into lines; `data:` lines carry `{"delta": {"text": ...}}` payloads whose
//! text is concatenated into one buffer. `data: [DONE]` ends the stream early.
//!
//! On completion the buffer is decoded in two stages:
//! 1. strip code fences and decode the span from the first `{` to the last
//!    `}` (outermost bounds, not balanced matching)
//! 2. on failure, normalise typographic quotes and line endings, then retry
//!    once
//!
//! The parser must see frames strictly in arrival order.

use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::session::PillResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("valid code fence pattern"));

#[derive(Debug, Deserialize)]
struct DeltaFrame {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    text: Option<String>,
}

/// Accumulates streamed frames into one structured result.
#[derive(Debug, Default)]
pub struct StreamingResponseParser {
    /// Bytes of an incomplete UTF-8 sequence split across frames.
    pending_bytes: Vec<u8>,
    /// Text of an incomplete line split across frames.
    line_buffer: String,
    accumulated: String,
    finished: bool,
    frames_seen: usize,
}

impl StreamingResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw frame. Returns `true` once the end sentinel was seen;
    /// later frames are ignored.
    pub fn push_frame(&mut self, frame: &[u8]) -> bool {
        if self.finished {
            return true;
        }
        self.frames_seen += 1;

        self.pending_bytes.extend_from_slice(frame);
        let text = self.take_decoded();
        self.push_text(&text)
    }

    /// Decodes the pending bytes, keeping a truncated trailing sequence for
    /// the next frame. Each invalid sequence becomes one U+FFFD; bytes after
    /// it are decoded on their own.
    fn take_decoded(&mut self) -> String {
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending_bytes.clear();
                    return text;
                }
                Err(e) => {
                    let Some(invalid) = e.error_len() else {
                        // Truncated tail: wait for the rest of the sequence.
                        let rest = self.pending_bytes.split_off(e.valid_up_to());
                        text.push_str(&String::from_utf8_lossy(&self.pending_bytes));
                        self.pending_bytes = rest;
                        return text;
                    };
                    let rest = self.pending_bytes.split_off(e.valid_up_to() + invalid);
                    text.push_str(&String::from_utf8_lossy(&self.pending_bytes));
                    self.pending_bytes = rest;
                }
            }
        }
    }

    pub fn push_str(&mut self, frame: &str) -> bool {
        self.push_frame(frame.as_bytes())
    }

    fn push_text(&mut self, text: &str) -> bool {
        self.line_buffer.push_str(text);

        while let Some(pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=pos).collect();
            if self.process_line(&line) {
                self.finished = true;
                self.line_buffer.clear();
                self.pending_bytes.clear();
                return true;
            }
        }
        false
    }

    /// Returns `true` for the end sentinel.
    fn process_line(&mut self, line: &str) -> bool {
        let Some(data) = line.trim_end().strip_prefix(DATA_PREFIX) else {
            return false;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            return true;
        }

        match serde_json::from_str::<DeltaFrame>(data) {
            Ok(DeltaFrame {
                delta: Some(Delta { text: Some(text) }),
            }) => self.accumulated.push_str(&text),
            Ok(_) => {}
            Err(e) => tracing::trace!("[Stream] Skipping undecodable data line: {}", e),
        }
        false
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text accumulated so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    /// Ends the stream and decodes the accumulated text.
    ///
    /// # Errors
    ///
    /// `MalformedResponse` if the text is empty, has no `{...}` span, or
    /// fails to decode after the repair pass.
    pub fn finish(mut self) -> Result<PillResult> {
        if !self.finished {
            if !self.pending_bytes.is_empty() {
                let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
                self.line_buffer.push_str(&tail);
            }
            let tail = std::mem::take(&mut self.line_buffer);
            self.process_line(&tail);
        }
        extract_result(&self.accumulated)
    }
}

/// Recovers a structured result from possibly decorated model output.
pub fn extract_result(text: &str) -> Result<PillResult> {
    if text.trim().is_empty() {
        return Err(MarginaliaError::malformed("empty response"));
    }

    let stripped = CODE_FENCE.replace_all(text, "");
    match decode_outer_span(&stripped) {
        Ok(result) => Ok(result),
        Err(first) => {
            tracing::debug!("[Stream] First decode failed ({}), repairing", first);
            let repaired = repair(&stripped);
            decode_outer_span(&repaired).map_err(|second| {
                MarginaliaError::malformed(format!("could not decode response: {second}"))
            })
        }
    }
}

fn decode_outer_span(text: &str) -> std::result::Result<PillResult, String> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err("no JSON object found".to_string());
    };
    if end < start {
        return Err("no JSON object found".to_string());
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| e.to_string())
}

/// Normalises typographic quotes to straight double quotes and line endings
/// to `\n`.
fn repair(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{2018}'
            | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '"',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::session::ResultMode;

    fn frame(text: &str) -> String {
        format!("data: {}\n\n", serde_json::json!({ "delta": { "text": text } }))
    }

    #[test]
    fn test_reassembles_text_split_mid_token() {
        let body = r#"{"pillText":"X","mode":"inline","explanation":"Y"}"#;
        let mut parser = StreamingResponseParser::new();
        for piece in [&body[..3], &body[3..11], &body[11..30], &body[30..]] {
            parser.push_str(&frame(piece));
        }
        assert!(parser.push_str("data: [DONE]\n"));

        let result = parser.finish().unwrap();
        assert_eq!(result.pill_text, "X");
        assert_eq!(result.mode, ResultMode::Inline);
        assert_eq!(result.explanation.as_deref(), Some("Y"));
    }

    #[test]
    fn test_frames_split_mid_line() {
        let wire = frame(r#"{"pillText":"Pi","mode":"reference","url":"https://pi.example"}"#);
        let mut parser = StreamingResponseParser::new();
        for chunk in wire.as_bytes().chunks(5) {
            parser.push_frame(chunk);
        }
        let result = parser.finish().unwrap();
        assert_eq!(result.mode, ResultMode::Reference);
        assert_eq!(result.url.as_deref(), Some("https://pi.example"));
    }

    #[test]
    fn test_multibyte_character_split_across_frames() {
        let wire = frame(r#"{"pillText":"café","mode":"inline"}"#);
        let bytes = wire.as_bytes();
        let split = wire.find('é').unwrap() + 1;
        let mut parser = StreamingResponseParser::new();
        parser.push_frame(&bytes[..split]);
        parser.push_frame(&bytes[split..]);
        assert_eq!(parser.finish().unwrap().pill_text, "café");
    }

    #[test]
    fn test_invalid_byte_does_not_swallow_split_character() {
        let wire = frame(r#"{"pillText":"café","mode":"inline"}"#);
        let bytes = wire.as_bytes();
        let split = wire.find('é').unwrap() + 1;

        // A stray invalid byte arrives ahead of a multibyte character that is
        // still split across frames.
        let mut parser = StreamingResponseParser::new();
        parser.push_frame(b": \xFF keep-alive\n");
        parser.push_frame(&bytes[..split]);
        parser.push_frame(&bytes[split..]);
        assert_eq!(parser.finish().unwrap().pill_text, "café");

        let mut parser = StreamingResponseParser::new();
        let mut first = b": \xFF\n".to_vec();
        first.extend_from_slice(&bytes[..split]);
        parser.push_frame(&first);
        parser.push_frame(&bytes[split..]);
        assert_eq!(parser.finish().unwrap().pill_text, "café");
    }

    #[test]
    fn test_indented_data_lines_are_not_data() {
        let mut parser = StreamingResponseParser::new();
        parser.push_str(&format!("  {}", frame("ignored")));
        parser.push_str(&frame("kept"));
        parser.push_str("data: [DONE]\r\n");
        assert!(parser.is_finished());
        assert_eq!(parser.accumulated(), "kept");
    }

    #[test]
    fn test_sentinel_ends_stream_early() {
        let mut parser = StreamingResponseParser::new();
        parser.push_str(&frame(r#"{"pillText":"A","mode":"inline"}"#));
        parser.push_str("data: [DONE]\n");
        parser.push_str(&frame("trailing garbage"));
        assert!(parser.is_finished());
        assert_eq!(parser.finish().unwrap().pill_text, "A");
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut parser = StreamingResponseParser::new();
        parser.push_str("event: message_start\n: keep-alive\n");
        parser.push_str(&frame(r#"{"pillText":"A","mode":"inline"}"#));
        parser.push_str("data: {\"type\":\"ping\"}\n");
        assert_eq!(parser.accumulated(), r#"{"pillText":"A","mode":"inline"}"#);
    }

    #[test]
    fn test_final_line_without_newline_is_flushed() {
        let mut parser = StreamingResponseParser::new();
        parser.push_str(r#"data: {"delta":{"text":"{\"pillText\":\"Z\"}"}}"#);
        let result = parser.finish().unwrap();
        assert_eq!(result.pill_text, "Z");
        assert_eq!(result.mode, ResultMode::Inline);
    }

    #[test]
    fn test_extract_strips_fences_and_commentary() {
        let text = "Sure! Here you go:\n```json\n{\"pillText\": \"Q\", \"mode\": \"inline\"}\n```\nHope that helps.";
        assert_eq!(extract_result(text).unwrap().pill_text, "Q");
    }

    #[test]
    fn test_repair_typographic_quotes() {
        let text = "\u{201C}{\u{201C}pillText\u{201D}: \u{2018}X\u{2019}, \u{2018}mode\u{2019}: \u{2018}inline\u{2019}}\u{201D}";
        let result = extract_result(text).unwrap();
        assert_eq!(result.pill_text, "X");
        assert_eq!(result.mode, ResultMode::Inline);
    }

    #[test]
    fn test_empty_and_unstructured_text_fail() {
        assert!(matches!(
            extract_result("   \n"),
            Err(MarginaliaError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_result("no braces here"),
            Err(MarginaliaError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_result("} backwards {"),
            Err(MarginaliaError::MalformedResponse(_))
        ));
        assert!(StreamingResponseParser::new().finish().is_err());
    }

    #[test]
    fn test_outer_span_includes_trailing_braces() {
        // Outermost bounds: a stray `}` after the object breaks decoding.
        let text = r#"{"pillText":"A","mode":"inline"} and {more}"#;
        assert!(extract_result(text).is_err());
    }
}
