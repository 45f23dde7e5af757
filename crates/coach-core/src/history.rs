//! ============================================================================
//! Conversation History - Embedded database (redb)
//! ============================================================================
//! Persistent local storage for chat exchanges, keyed by conversation id and
//! sequence number. Default path: ~/.coach/history.redb (override via the
//! COACH_DB_PATH env var). The server keeps working without history when the
//! database cannot be opened.
//! ============================================================================

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Rendered when a conversation has no stored turns
pub const EMPTY_HISTORY: &str = "No hay historial previo de conversación.";

/// One stored chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub conversation_id: String,
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Embedded conversation store
pub struct ConversationStore {
    db: Database,
    path: PathBuf,
}

impl ConversationStore {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses COACH_DB_PATH env var or ~/.coach/history.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("COACH_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let coach_dir = home.join(".coach");
            std::fs::create_dir_all(&coach_dir)
                .map_err(|e| anyhow!("Failed to create .coach directory: {}", e))?;
            coach_dir.join("history.redb")
        };

        info!("Opening history database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open history database: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(MESSAGES)
                .map_err(|e| anyhow!("Failed to create messages table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message to a conversation
    pub fn append(&self, conversation_id: &str, role: &str, content: &str) -> Result<()> {
        let seq = self.message_count(conversation_id)?;
        let key = message_key(conversation_id, seq);

        let message = StoredMessage {
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        let value =
            bincode::serialize(&message).map_err(|e| anyhow!("Failed to serialize message: {}", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(MESSAGES)
                .map_err(|e| anyhow!("Failed to open messages table: {}", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert message: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored message #{} for conversation {}", seq, conversation_id);
        Ok(())
    }

    /// Last `limit` messages of a conversation, oldest first
    pub fn history(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let messages = self.all_messages(conversation_id)?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    /// History rendered for prompt injection
    pub fn formatted_history(&self, conversation_id: &str, limit: usize) -> Result<String> {
        let messages = self.history(conversation_id, limit)?;
        if messages.is_empty() {
            return Ok(EMPTY_HISTORY.to_string());
        }

        let lines: Vec<String> = messages
            .iter()
            .map(|message| {
                let label = if message.role == "user" {
                    "Usuario"
                } else {
                    "Asistente"
                };
                format!("{}: {}", label, message.content)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Delete all messages of a conversation, returning how many were removed
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<usize> {
        let keys: Vec<String> = {
            let read_txn = self
                .db
                .begin_read()
                .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
            let table = read_txn
                .open_table(MESSAGES)
                .map_err(|e| anyhow!("Failed to open messages table: {}", e))?;

            let (start, end) = key_range(conversation_id);
            let iter = table
                .range(start.as_str()..end.as_str())
                .map_err(|e| anyhow!("Failed to iterate messages: {}", e))?;

            let mut keys = Vec::new();
            for entry in iter {
                let (key, _value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                keys.push(key.value().to_string());
            }
            keys
        };

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(MESSAGES)
                .map_err(|e| anyhow!("Failed to open messages table: {}", e))?;
            for key in &keys {
                table
                    .remove(key.as_str())
                    .map_err(|e| anyhow!("Failed to remove message: {}", e))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if !keys.is_empty() {
            info!(
                "Deleted {} messages from conversation {}",
                keys.len(),
                conversation_id
            );
        }
        Ok(keys.len())
    }

    /// Number of messages in a conversation
    pub fn message_count(&self, conversation_id: &str) -> Result<usize> {
        Ok(self.all_messages(conversation_id)?.len())
    }

    fn all_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(MESSAGES)
            .map_err(|e| anyhow!("Failed to open messages table: {}", e))?;

        let (start, end) = key_range(conversation_id);
        let iter = table
            .range(start.as_str()..end.as_str())
            .map_err(|e| anyhow!("Failed to iterate messages: {}", e))?;

        let mut messages = Vec::new();
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let message: StoredMessage = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize message: {}", e))?;
            messages.push(message);
        }
        Ok(messages)
    }
}

/// Zero-padded keys keep redb's lexicographic order chronological
fn message_key(conversation_id: &str, seq: usize) -> String {
    format!("msg:{}:{:010}", conversation_id, seq)
}

/// Half-open key range covering every message of one conversation.
/// ';' is the successor of ':' in ASCII, so the range is a prefix scan.
fn key_range(conversation_id: &str) -> (String, String) {
    (
        format!("msg:{}:", conversation_id),
        format!("msg:{};", conversation_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (ConversationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.redb");
        let store = ConversationStore::open(Some(path.to_str().unwrap())).unwrap();
        (store, dir)
    }

    #[test]
    fn test_append_and_history_order() {
        let (store, _dir) = open_store();
        store.append("conv-1", "user", "¿Qué es el RAG?").unwrap();
        store.append("conv-1", "assistant", "Es una técnica...").unwrap();
        store.append("conv-1", "user", "¿Y los embeddings?").unwrap();

        let history = store.history("conv-1", 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "¿Qué es el RAG?");
        assert_eq!(history[2].content, "¿Y los embeddings?");
    }

    #[test]
    fn test_history_limit_keeps_latest() {
        let (store, _dir) = open_store();
        for i in 0..5 {
            store.append("conv-1", "user", &format!("mensaje {}", i)).unwrap();
        }

        let history = store.history("conv-1", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "mensaje 3");
        assert_eq!(history[1].content, "mensaje 4");
    }

    #[test]
    fn test_conversations_are_isolated() {
        let (store, _dir) = open_store();
        store.append("conv-a", "user", "hola").unwrap();
        store.append("conv-b", "user", "buenas").unwrap();

        assert_eq!(store.message_count("conv-a").unwrap(), 1);
        assert_eq!(store.message_count("conv-b").unwrap(), 1);
        assert_eq!(store.history("conv-a", 10).unwrap()[0].content, "hola");
    }

    #[test]
    fn test_formatted_history() {
        let (store, _dir) = open_store();
        store.append("conv-1", "user", "hola").unwrap();
        store.append("conv-1", "assistant", "¡Hola! ¿En qué puedo ayudarte?").unwrap();

        let formatted = store.formatted_history("conv-1", 10).unwrap();
        assert_eq!(formatted, "Usuario: hola\nAsistente: ¡Hola! ¿En qué puedo ayudarte?");
    }

    #[test]
    fn test_formatted_history_empty() {
        let (store, _dir) = open_store();
        assert_eq!(store.formatted_history("nadie", 10).unwrap(), EMPTY_HISTORY);
    }

    #[test]
    fn test_delete_conversation() {
        let (store, _dir) = open_store();
        store.append("conv-1", "user", "hola").unwrap();
        store.append("conv-1", "assistant", "hola").unwrap();
        store.append("conv-2", "user", "otro").unwrap();

        let deleted = store.delete_conversation("conv-1").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.message_count("conv-1").unwrap(), 0);
        assert_eq!(store.message_count("conv-2").unwrap(), 1);
    }

    #[test]
    fn test_key_order_is_chronological() {
        // 10-digit zero padding keeps string order == numeric order.
        assert!(message_key("c", 9) < message_key("c", 10));
        assert!(message_key("c", 99) < message_key("c", 1_000_000));
    }
}
