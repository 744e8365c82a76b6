//! Canonical ordering and export of the display timeline.
//!
//! The wire protocol may emit a sources event before the assistant begins
//! answering or after its turn was created, so arrival order is not a
//! stable order for persistence or export. `reorder` produces a canonical
//! sequence where every annotation block sits adjacent to the turn it
//! describes, whatever order the events arrived in.

use kbchat_types::{Role, TimelineEntry};

/// Reorder a timeline so annotation blocks are adjacent to their turns.
///
/// Single forward pass with a pending buffer: annotations are held back,
/// flushed (in original relative order) immediately before the next user
/// turn or immediately after the assistant turn just appended, and any
/// remainder lands at the tail. Applying the pass twice yields the same
/// sequence.
pub fn reorder(entries: Vec<TimelineEntry>) -> Vec<TimelineEntry> {
    let mut ordered = Vec::with_capacity(entries.len());
    let mut pending: Vec<TimelineEntry> = Vec::new();

    for entry in entries {
        match &entry {
            TimelineEntry::Sources(_) => pending.push(entry),
            TimelineEntry::Turn(turn) => match turn.role {
                Role::User => {
                    ordered.append(&mut pending);
                    ordered.push(entry);
                }
                Role::Assistant => {
                    ordered.push(entry);
                    ordered.append(&mut pending);
                }
            },
        }
    }
    ordered.append(&mut pending);
    ordered
}

/// Render a reordered timeline as a plain-text transcript.
///
/// Format: `Q.`/`A.` per turn, `[Sources]` blocks with title, similarity
/// percentage, url and a truncated snippet, closed with a separator line.
pub fn render_plain_text(entries: &[TimelineEntry]) -> String {
    let mut out = String::new();

    for entry in entries {
        match entry {
            TimelineEntry::Turn(turn) => match turn.role {
                Role::User => {
                    out.push_str(&format!("Q. {}\n\n", turn.content));
                }
                Role::Assistant => {
                    out.push_str(&format!("A. {}\n\n", turn.content));
                }
            },
            TimelineEntry::Sources(block) => {
                out.push_str("[Sources]\n");
                for (idx, src) in block.sources.iter().enumerate() {
                    out.push_str(&format!(
                        "{}. {} ({}%)\n",
                        idx + 1,
                        src.title,
                        (src.similarity * 100.0).round() as i64
                    ));
                    out.push_str(&format!("   {}\n", src.url));
                    if !src.text_snippet.is_empty() {
                        out.push_str(&format!("   {}...\n", truncate_chars(&src.text_snippet, 100)));
                    }
                }
                if let Some(tokens) = block.tokens {
                    out.push_str(&format!("   Tokens: {}\n", tokens));
                }
                out.push('\n');
            }
        }
    }

    out.push_str("=====\n");
    out
}

/// Derive a conversation title from its first user turn: trimmed,
/// truncated to 20 characters.
pub fn generate_title(entries: &[TimelineEntry]) -> String {
    let first_user = entries.iter().find_map(|entry| {
        entry
            .as_turn()
            .filter(|turn| turn.role == Role::User)
            .map(|turn| turn.content.trim())
    });

    match first_user {
        Some(content) if !content.is_empty() => {
            if content.chars().count() > 20 {
                format!("{}...", truncate_chars(content, 20))
            } else {
                content.to_string()
            }
        }
        _ => "New conversation".to_string(),
    }
}

/// Truncate at a character boundary, never mid code point.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
