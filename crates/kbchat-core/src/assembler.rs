//! Conversation assembly from interpreted stream events.
//!
//! The assembler owns all Turn and AnnotationBlock mutation for one
//! conversation. Two views are maintained over a single arena of turns:
//! the canonical conversation (the arena itself, in append order; this is
//! what goes back to the server as context) and the display timeline,
//! which interleaves citation blocks with references into the arena. The
//! shared arena means the views cannot diverge.
//!
//! Events are applied strictly in arrival order on one task; the cursors
//! (`active_turn`, `last_annotation`) make every rule O(1).

use kbchat_types::{AnnotationBlock, SourceRecord, StreamEvent, TimelineEntry, Turn};

/// Stream lifecycle for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// No transfer in progress
    Idle,
    /// Receiving retrieval results and/or reasoning, no answer text yet
    Streaming,
    /// The stream ended normally
    Completed,
    /// The server reported an error
    Errored,
    /// The watchdog cancelled the transfer
    Aborted,
}

/// One slot of the display timeline: either a reference into the turn
/// arena or an owned annotation block.
#[derive(Debug, Clone)]
enum TimelineSlot {
    Turn(usize),
    Annotation(AnnotationBlock),
}

/// Builds the canonical conversation and the display timeline from a
/// stream of events.
#[derive(Debug)]
pub struct ConversationAssembler {
    /// Arena of turns in chronological order; this IS the canonical
    /// conversation
    turns: Vec<Turn>,
    /// Display order: turn references interleaved with annotations
    timeline: Vec<TimelineSlot>,
    /// Arena index of the assistant turn being built this stream
    active_turn: Option<usize>,
    /// Timeline index of the most recently appended annotation
    last_annotation: Option<usize>,
    phase: StreamPhase,
    /// Session-level error reported by the server, if any
    error: Option<String>,
}

impl Default for ConversationAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationAssembler {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            timeline: Vec::new(),
            active_turn: None,
            last_annotation: None,
            phase: StreamPhase::Idle,
            error: None,
        }
    }

    /// Rebuild an assembler from a persisted timeline (resuming a stored
    /// conversation).
    pub fn from_entries(entries: Vec<TimelineEntry>) -> Self {
        let mut assembler = Self::new();
        for entry in entries {
            match entry {
                TimelineEntry::Turn(turn) => {
                    assembler.turns.push(turn);
                    assembler
                        .timeline
                        .push(TimelineSlot::Turn(assembler.turns.len() - 1));
                }
                TimelineEntry::Sources(block) => {
                    assembler.timeline.push(TimelineSlot::Annotation(block));
                    assembler.last_annotation = Some(assembler.timeline.len() - 1);
                }
            }
        }
        assembler
    }

    /// Record the user's message and arm the assembler for a new stream.
    /// The active-turn cursor is cleared so the prior stream's turn can no
    /// longer be mutated; the annotation cursor tracks the timeline as a
    /// whole and carries over.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
        self.timeline.push(TimelineSlot::Turn(self.turns.len() - 1));
        self.active_turn = None;
        self.error = None;
        self.phase = StreamPhase::Streaming;
    }

    /// Apply one data event. Events for a stream must arrive on one task,
    /// in order.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Sources(sources) => self.on_sources(sources),
            StreamEvent::Reasoning(delta) => self.on_reasoning(&delta),
            StreamEvent::Token(delta) => self.on_token(&delta),
            StreamEvent::Done { tokens } => self.on_done(tokens),
            StreamEvent::Error(message) => self.on_error(message),
        }
    }

    fn on_sources(&mut self, sources: Vec<SourceRecord>) {
        tracing::debug!(
            target: "kbchat::assembler",
            "Appending annotation block with {} sources",
            sources.len()
        );
        self.timeline
            .push(TimelineSlot::Annotation(AnnotationBlock::new(sources)));
        self.last_annotation = Some(self.timeline.len() - 1);
    }

    fn on_reasoning(&mut self, delta: &str) {
        match self.active_turn {
            Some(idx) => self.turns[idx].append_reasoning(delta),
            None => {
                self.turns.push(Turn::assistant_reasoning(delta));
                let idx = self.turns.len() - 1;
                self.timeline.push(TimelineSlot::Turn(idx));
                self.active_turn = Some(idx);
            }
        }
    }

    fn on_token(&mut self, delta: &str) {
        match self.active_turn {
            Some(idx) => self.turns[idx].append_content(delta),
            None => {
                self.turns.push(Turn::assistant(delta));
                let idx = self.turns.len() - 1;
                self.timeline.push(TimelineSlot::Turn(idx));
                self.active_turn = Some(idx);
            }
        }
    }

    fn on_done(&mut self, tokens: u64) {
        match self.last_annotation {
            Some(idx) => {
                if let TimelineSlot::Annotation(block) = &mut self.timeline[idx] {
                    block.tokens = Some(tokens);
                }
            }
            // No sources were sent this stream; usage has nowhere to go
            None => {
                tracing::debug!(
                    target: "kbchat::assembler",
                    "Done event with no annotation block, dropping usage ({} tokens)",
                    tokens
                );
            }
        }
    }

    fn on_error(&mut self, message: String) {
        // Partial turn state is useful and is kept
        tracing::warn!(target: "kbchat::assembler", "Server reported error: {}", message);
        self.error = Some(message);
        self.phase = StreamPhase::Errored;
    }

    /// Mark the stream finished. An error observed earlier takes
    /// precedence over natural completion.
    pub fn finish(&mut self) {
        if self.phase != StreamPhase::Errored {
            self.phase = StreamPhase::Completed;
        }
        self.active_turn = None;
    }

    /// Mark the stream cancelled by the watchdog. Applied state remains.
    pub fn mark_aborted(&mut self) {
        self.phase = StreamPhase::Aborted;
        self.active_turn = None;
    }

    /// The canonical conversation: turns only, in strict arrival order.
    pub fn conversation(&self) -> &[Turn] {
        &self.turns
    }

    /// The display timeline in arrival order, as owned entries.
    pub fn display_timeline(&self) -> Vec<TimelineEntry> {
        self.timeline
            .iter()
            .map(|slot| match slot {
                TimelineSlot::Turn(idx) => TimelineEntry::Turn(self.turns[*idx].clone()),
                TimelineSlot::Annotation(block) => TimelineEntry::Sources(block.clone()),
            })
            .collect()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// The server-reported error for this stream, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Drop all conversation state.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.timeline.clear();
        self.active_turn = None;
        self.last_annotation = None;
        self.error = None;
        self.phase = StreamPhase::Idle;
    }
}
