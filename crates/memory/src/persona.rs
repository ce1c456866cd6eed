//! Per-user persona ("memory") text, one JSON file per user.

use chrono::{DateTime, Utc};
use rivet_core::error::MemoryError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaRecord {
    pub user_id: String,
    pub memory: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PersonaStore {
    dir: PathBuf,
}

impl PersonaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }

    pub async fn save(&self, user_id: &str, memory: &str) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to create memory directory: {e}")))?;

        let record = PersonaRecord {
            user_id: user_id.to_string(),
            memory: memory.to_string(),
            updated_at: Utc::now(),
        };
        let data = serde_json::to_string_pretty(&record)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize persona: {e}")))?;
        tokio::fs::write(self.path_for(user_id), data)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write persona: {e}")))?;

        debug!(user = %user_id, "Persona saved");
        Ok(())
    }

    /// The stored persona text, or `None` when the user has none.
    pub async fn load(&self, user_id: &str) -> Result<Option<String>, MemoryError> {
        let data = match tokio::fs::read_to_string(self.path_for(user_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MemoryError::Storage(format!("Failed to read persona: {e}"))),
        };
        let record: PersonaRecord =
            serde_json::from_str(&data).map_err(|e| MemoryError::Corrupted {
                id: user_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(record.memory))
    }
}
