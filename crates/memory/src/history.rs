//! File-based conversation history.
//!
//! One pretty-printed JSON document per conversation:
//! `<history_dir>/<id>.json`. The id is `<user>_<unix-seconds>`.

use chrono::{DateTime, Utc};
use rivet_core::error::MemoryError;
use rivet_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A stored message: role, text and when it was said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A saved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub user_id: String,
    pub model: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(user_id: impl Into<String>, model: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let now = Utc::now();
        Self {
            id: format!("{user_id}_{}", now.timestamp()),
            user_id,
            model: model.into(),
            messages: Vec::new(),
            created: now,
            updated: now,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(HistoryMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// The last `n` messages; everything when `n` is zero or covers the lot.
    pub fn recent(&self, n: usize) -> &[HistoryMessage] {
        if n == 0 || n >= self.messages.len() {
            return &self.messages;
        }
        &self.messages[self.messages.len() - n..]
    }

    /// Prior turns as conversation messages for the next model call.
    ///
    /// Only user and assistant text is replayed; tool exchanges are not stored.
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter_map(|m| {
                let mut message = match m.role {
                    Role::User => Message::user(m.content.clone()),
                    Role::Assistant => Message::assistant(m.content.clone()),
                    Role::System | Role::Tool => return None,
                };
                message.timestamp = m.timestamp;
                Some(message)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Directory of saved conversations.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Create the history directory.
    pub async fn init(&self) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to create history directory: {e}")))
    }

    /// Persist `record`, bumping its `updated` stamp.
    pub async fn save(&self, record: &mut ConversationRecord) -> Result<(), MemoryError> {
        record.updated = Utc::now();
        self.init().await?;

        let data = serde_json::to_string_pretty(record)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize conversation: {e}")))?;
        tokio::fs::write(self.path_for(&record.id), data)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write conversation: {e}")))?;

        debug!(id = %record.id, messages = record.messages.len(), "Conversation saved");
        Ok(())
    }

    pub async fn load(&self, id: &str) -> Result<ConversationRecord, MemoryError> {
        let data = match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MemoryError::NotFound(id.to_string()));
            }
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read conversation {id}: {e}"
                )));
            }
        };

        serde_json::from_str(&data).map_err(|e| MemoryError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Conversations of `user_id` (all users when empty), newest first.
    ///
    /// Unreadable files are skipped.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ConversationRecord>, MemoryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read history directory: {e}"
                )));
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id).await {
                Ok(record) if user_id.is_empty() || record.user_id == user_id => {
                    records.push(record)
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable conversation"),
            }
        }

        records.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(records)
    }

    pub async fn delete(&self, id: &str) -> Result<(), MemoryError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MemoryError::NotFound(id.to_string()))
            }
            Err(e) => Err(MemoryError::Storage(format!(
                "Failed to delete conversation {id}: {e}"
            ))),
        }
    }
}
