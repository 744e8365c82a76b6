//! Shared data model for kbchat.

mod chat;
mod wire;

pub use chat::{
    AnnotationBlock, Conversation, Role, SourceRecord, TimelineEntry, Turn,
};
pub use wire::{ChatRequest, LlmConfig, StatusToken, StreamEvent};
