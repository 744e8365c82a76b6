//! Streaming consumer and conversation assembly for kbchat.

mod assembler;
mod client;
mod decode;
mod error;
mod protocol;
mod store;
mod stream;
mod transcript;
mod watchdog;

pub use assembler::{ConversationAssembler, StreamPhase};
pub use client::ChatClient;
pub use decode::LineDecoder;
pub use error::ChatError;
pub use protocol::{interpret_line, ParsedLine};
pub use store::{ConversationStore, ConversationSummary};
pub use stream::{consume_stream, StreamNotice, StreamOutcome};
pub use transcript::{generate_title, render_plain_text, reorder};
pub use watchdog::{ActivityHandle, Watchdog, WatchdogConfig, WatchdogSignal};

/// Result type for kbchat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
