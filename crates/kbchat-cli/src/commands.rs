//! Subcommand implementations.

use anyhow::Result;
use kbchat_core::{
    consume_stream, generate_title, render_plain_text, reorder, ChatClient,
    ConversationAssembler, ConversationStore, StreamNotice, StreamOutcome,
};
use kbchat_types::{Conversation, StreamEvent};
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Ask a single question and stream the answer, then save.
pub async fn ask(config: Config, question: &str, conversation_id: Option<Uuid>) -> Result<()> {
    let store = ConversationStore::open(&config.db_path)?;
    let mut conversation = load_or_create(&store, conversation_id)?;

    run_exchange(&config, &store, &mut conversation, question).await?;
    eprintln!("Conversation: {}", conversation.id);
    Ok(())
}

/// Interactive chat loop. Each exchange is saved as it completes, so a
/// killed session loses at most the in-flight answer.
pub async fn chat(config: Config, conversation_id: Option<Uuid>) -> Result<()> {
    let store = ConversationStore::open(&config.db_path)?;
    let mut conversation = load_or_create(&store, conversation_id)?;

    println!("kbchat - ask a question, or 'exit' to quit");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        // A failed exchange ends one answer, not the session
        if let Err(e) = run_exchange(&config, &store, &mut conversation, question).await {
            eprintln!("Error: {}", e);
        }
    }

    eprintln!("Saved conversation {}", conversation.id);
    Ok(())
}

/// List stored conversations, most recently updated first.
pub fn list(config: Config) -> Result<()> {
    let store = ConversationStore::open(&config.db_path)?;
    let conversations = store.list()?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    for summary in conversations {
        println!(
            "{}  {}  ({} turns, updated {})",
            summary.id,
            summary.title,
            summary.turn_count,
            summary.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

/// Export a conversation as a plain-text transcript.
pub fn export(config: Config, id: Uuid, output: Option<PathBuf>) -> Result<()> {
    let store = ConversationStore::open(&config.db_path)?;
    let conversation = store.get_required(id)?;

    let text = render_plain_text(&reorder(conversation.entries));
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            eprintln!("Exported to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Delete a conversation.
pub fn delete(config: Config, id: Uuid) -> Result<()> {
    let store = ConversationStore::open(&config.db_path)?;
    store.delete(id)?;
    println!("Deleted {}", id);
    Ok(())
}

fn load_or_create(store: &ConversationStore, id: Option<Uuid>) -> Result<Conversation> {
    match id {
        Some(id) => Ok(store.get_required(id)?),
        None => Ok(Conversation::new()),
    }
}

/// Run one question through the server and fold the stream into the
/// conversation. State is saved whatever the outcome; a stalled or
/// failed stream keeps its partial answer.
async fn run_exchange(
    config: &Config,
    store: &ConversationStore,
    conversation: &mut Conversation,
    question: &str,
) -> Result<()> {
    let client = ChatClient::new(
        config.server_url.clone(),
        config.llm(),
        config.context_length,
    );
    let mut assembler = ConversationAssembler::from_entries(conversation.entries.clone());

    // Context is the conversation before this question
    let body = client.open_stream(question, assembler.conversation()).await?;
    assembler.push_user(question);

    let mut stdout = std::io::stdout();
    let mut thinking_shown = false;
    let outcome = consume_stream(body, &mut assembler, config.watchdog(), |notice| {
        match notice {
            StreamNotice::Event(StreamEvent::Token(delta)) => {
                let _ = stdout.write_all(delta.as_bytes());
                let _ = stdout.flush();
            }
            StreamNotice::Event(StreamEvent::Reasoning(_)) => {
                if !thinking_shown {
                    eprintln!("(thinking...)");
                    thinking_shown = true;
                }
            }
            StreamNotice::Event(StreamEvent::Sources(sources)) => {
                eprintln!("(retrieved {} sources)", sources.len());
            }
            StreamNotice::Event(_) | StreamNotice::Status(_) => {}
            StreamNotice::StallWarning { idle_secs } => {
                eprintln!("(still waiting, {}s without data)", idle_secs);
            }
        }
    })
    .await;
    println!();

    conversation.entries = reorder(assembler.display_timeline());
    if conversation.title == "New conversation" {
        conversation.title = generate_title(&conversation.entries);
    }
    conversation.updated_at = chrono::Utc::now();
    store.save(conversation)?;

    match outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::ProtocolError(message) => {
            eprintln!("Server error: {}", message);
            Ok(())
        }
        StreamOutcome::LivenessTimeout { idle_secs } => {
            eprintln!(
                "Stream stalled ({}s without data); partial answer kept",
                idle_secs
            );
            Ok(())
        }
        StreamOutcome::TransportFailure(message) => {
            eprintln!("Connection lost: {}; partial answer kept", message);
            Ok(())
        }
    }
}
