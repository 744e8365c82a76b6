//! Wire protocol types for the streaming chat endpoint.
//!
//! The response body is line-delimited text. Status comments (`: <token>`)
//! report server-side phase transitions; data lines (`data: <json>`) carry
//! the actual payloads. Both interleave on one connection, so they are two
//! variants of one decoded event rather than separate streams.

use crate::chat::{SourceRecord, Turn};
use serde::{Deserialize, Serialize};

/// A typed data event from a `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Retrieved sources for the answer being generated
    Sources(Vec<SourceRecord>),
    /// Reasoning text delta
    Reasoning(String),
    /// Answer text delta
    Token(String),
    /// Generation finished; reports token usage
    Done { tokens: u64 },
    /// Server-side failure, human-readable
    Error(String),
}

/// Server phase reported by a status comment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusToken {
    Connected,
    ChatEngineCreated,
    RetrievalDone,
    SourcesSent,
    Generating,
    Heartbeat,
    Completed,
}

impl StatusToken {
    /// Parse a status token. Unknown tokens are not an error; the caller
    /// ignores the line.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "connected" => Some(Self::Connected),
            "chat_engine_created" => Some(Self::ChatEngineCreated),
            "retrieval_done" => Some(Self::RetrievalDone),
            "sources_sent" => Some(Self::SourcesSent),
            "generating" => Some(Self::Generating),
            "heartbeat" => Some(Self::Heartbeat),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// LLM connection settings forwarded with each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
}

/// Request body for the streaming chat endpoint.
///
/// `conversation` is the canonical turn list (already trimmed to the
/// configured context window by the caller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation: Vec<Turn>,
    pub config: LlmConfig,
}
