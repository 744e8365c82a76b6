//! Classification of decoded lines into protocol events.
//!
//! The stream carries two interleaved channels on one connection: status
//! comments (`: <token>`) and typed data lines (`data: <json>`). Anything
//! else is noise and skipped. A payload that fails to parse discards only
//! the offending line, never the stream.

use kbchat_types::{StatusToken, StreamEvent};

const STATUS_PREFIX: &str = ": ";
const DATA_PREFIX: &str = "data: ";

/// Result of interpreting one decoded line.
#[derive(Debug, Clone)]
pub enum ParsedLine {
    /// Recognized status comment
    Status(StatusToken),
    /// Typed data event
    Data(StreamEvent),
    /// Neither prefix matched, or an unknown status token; skipped
    Ignored,
    /// Data prefix matched but the payload failed to parse; skipped
    Malformed,
}

/// Classify one line of the response body.
pub fn interpret_line(line: &str) -> ParsedLine {
    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        return match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => ParsedLine::Data(event),
            Err(e) => {
                tracing::warn!(
                    target: "kbchat::protocol",
                    "Discarding malformed data line: {} (payload: {})",
                    e,
                    payload
                );
                ParsedLine::Malformed
            }
        };
    }

    if let Some(token) = line.strip_prefix(STATUS_PREFIX) {
        return match StatusToken::parse(token.trim()) {
            Some(status) => ParsedLine::Status(status),
            None => {
                tracing::debug!(target: "kbchat::protocol", "Unknown status token: {}", token);
                ParsedLine::Ignored
            }
        };
    }

    ParsedLine::Ignored
}
