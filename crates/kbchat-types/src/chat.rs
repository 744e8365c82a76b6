//! Conversation and timeline types.
//!
//! A conversation is tracked in two views: the canonical turn list (what is
//! sent back to the server as dialogue context) and a display timeline that
//! also carries source-citation blocks interleaved with the turns.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User's question
    User,
    /// Model's answer
    Assistant,
}

/// A single contribution to the dialogue.
///
/// Content and reasoning are append-only while the turn is streaming.
/// Reasoning arrives on a separate channel from the answer text and is
/// displayed differently, so the two are kept apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who authored this turn
    pub role: Role,
    /// Answer text (may be partial during streaming)
    pub content: String,
    /// Model reasoning text, if the stream carried any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// True while the most recent delta was reasoning; cleared once
    /// ordinary content starts arriving
    #[serde(default)]
    pub reasoning_active: bool,
}

impl Turn {
    /// Create a completed user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            reasoning: None,
            reasoning_active: false,
        }
    }

    /// Create an assistant turn whose first delta was answer content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning: None,
            reasoning_active: false,
        }
    }

    /// Create an assistant turn whose first delta was reasoning.
    pub fn assistant_reasoning(delta: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            reasoning: Some(delta.into()),
            reasoning_active: true,
        }
    }

    /// Append an answer delta. Content delivery supersedes reasoning
    /// display state.
    pub fn append_content(&mut self, delta: &str) {
        self.content.push_str(delta);
        self.reasoning_active = false;
    }

    /// Append a reasoning delta.
    pub fn append_reasoning(&mut self, delta: &str) {
        self.reasoning.get_or_insert_with(String::new).push_str(delta);
        self.reasoning_active = true;
    }
}

/// One retrieved source record cited by the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub doc_id: String,
    pub similarity: f64,
    pub text_snippet: String,
    pub url: String,
}

/// A citation block attached to the display timeline.
///
/// Created when a `sources` event arrives; `tokens` is filled in once when
/// the completion event supplies usage, otherwise the block is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationBlock {
    /// Retrieved sources, in relevance order
    pub sources: Vec<SourceRecord>,
    /// Token usage reported by the completion event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl AnnotationBlock {
    pub fn new(sources: Vec<SourceRecord>) -> Self {
        Self {
            sources,
            tokens: None,
        }
    }
}

/// One entry of the display timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    /// A dialogue turn
    Turn(Turn),
    /// A source-citation block
    Sources(AnnotationBlock),
}

impl TimelineEntry {
    /// The contained turn, if this entry is one.
    pub fn as_turn(&self) -> Option<&Turn> {
        match self {
            TimelineEntry::Turn(turn) => Some(turn),
            TimelineEntry::Sources(_) => None,
        }
    }
}

/// A persisted conversation: the display timeline plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub entries: Vec<TimelineEntry>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Conversation {
    /// Create an empty conversation with a placeholder title.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: "New conversation".to_string(),
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
