//! SQLite persistence for conversations.

use crate::{ChatError, Result};
use kbchat_types::{Conversation, TimelineEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// SQLite-based conversation store.
///
/// Timeline entries are stored as one JSON document per conversation; the
/// store never queries inside them.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

/// One row of the conversation list, without the timeline payload.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub turn_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                entries TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a conversation. `updated_at` is refreshed here.
    pub fn save(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let entries_json = serde_json::to_string(&conversation.entries)?;
        conn.execute(
            r#"
            INSERT INTO conversations (id, title, entries, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                entries = excluded.entries,
                updated_at = excluded.updated_at
            "#,
            params![
                conversation.id.to_string(),
                conversation.title,
                entries_json,
                conversation.created_at.to_rfc3339(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a conversation by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let conversation = conn
            .query_row(
                "SELECT * FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |row| Self::row_to_conversation(row),
            )
            .optional()?;
        Ok(conversation)
    }

    /// Get a conversation, failing if it does not exist.
    pub fn get_required(&self, id: Uuid) -> Result<Conversation> {
        self.get(id)?.ok_or(ChatError::ConversationNotFound(id))
    }

    /// List all conversations, most recently updated first.
    pub fn list(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM conversations ORDER BY updated_at DESC")?;
        let conversations = stmt
            .query_map([], |row| Self::row_to_summary(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    /// Delete a conversation. Missing IDs are not an error.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
        let id: String = row.get("id")?;
        let title: String = row.get("title")?;
        let entries_json: String = row.get("entries")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let entries: Vec<TimelineEntry> =
            serde_json::from_str(&entries_json).unwrap_or_default();

        Ok(Conversation {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            title,
            entries,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_default(),
            updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_default(),
        })
    }

    fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<ConversationSummary> {
        let conversation = Self::row_to_conversation(row)?;
        let turn_count = conversation
            .entries
            .iter()
            .filter(|e| e.as_turn().is_some())
            .count();
        Ok(ConversationSummary {
            id: conversation.id,
            title: conversation.title,
            turn_count,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbchat_types::Turn;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> ConversationStore {
        ConversationStore::open(&dir.path().join("kbchat.db")).unwrap()
    }

    fn sample_conversation(title: &str) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.title = title.to_string();
        conversation.entries = vec![
            TimelineEntry::Turn(Turn::user("question")),
            TimelineEntry::Turn(Turn::assistant("answer")),
        ];
        conversation
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let conversation = sample_conversation("first");
        store.save(&conversation).unwrap();

        let loaded = store.get(conversation.id).unwrap().unwrap();
        assert_eq!(loaded.title, "first");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].as_turn().unwrap().content, "question");
    }

    #[test]
    fn test_get_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_get_required_missing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let id = Uuid::new_v4();
        match store.get_required(id) {
            Err(ChatError::ConversationNotFound(missing)) => assert_eq!(missing, id),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("expected not-found error"),
        }
    }

    #[test]
    fn test_save_twice_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut conversation = sample_conversation("before");
        store.save(&conversation).unwrap();

        conversation.title = "after".to_string();
        conversation
            .entries
            .push(TimelineEntry::Turn(Turn::user("followup")));
        store.save(&conversation).unwrap();

        let loaded = store.get(conversation.id).unwrap().unwrap();
        assert_eq!(loaded.title, "after");
        assert_eq!(loaded.entries.len(), 3);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_list_orders_by_most_recent_update() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let older = sample_conversation("older");
        let newer = sample_conversation("newer");
        store.save(&older).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        store.save(&newer).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        // Touching the older one moves it to the front
        store.save(&older).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "older");
        assert_eq!(listed[1].title, "newer");
        assert_eq!(listed[0].turn_count, 2);
    }

    #[test]
    fn test_delete_removes_conversation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let conversation = sample_conversation("doomed");
        store.save(&conversation).unwrap();
        store.delete(conversation.id).unwrap();

        assert!(store.get(conversation.id).unwrap().is_none());
        // Deleting again is a no-op
        store.delete(conversation.id).unwrap();
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let conversation = sample_conversation("persistent");
        {
            let store = open_store(&dir);
            store.save(&conversation).unwrap();
        }
        let store = open_store(&dir);
        assert!(store.get(conversation.id).unwrap().is_some());
    }
}
