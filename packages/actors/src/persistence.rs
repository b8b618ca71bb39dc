//! File-based journal that makes a topic survive restarts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::messages::BusMessage;

/// Everything a topic has not yet finished.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub messages: Vec<BusMessage>,
}

/// Snapshot file for one topic.
///
/// The whole unfinished set is rewritten on every change. Topics carry only
/// job references, so the file stays small.
pub struct TopicJournal {
    path: PathBuf,
}

impl TopicJournal {
    /// Journal for `topic` stored under `dir`.
    pub fn new(dir: impl AsRef<Path>, topic: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", topic)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot.
    pub async fn save(&self, snapshot: &TopicSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(snapshot)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.path).await?;

        tracing::debug!("Saved {} message(s) to {:?}", snapshot.messages.len(), self.path);
        Ok(())
    }

    /// Read the snapshot, if one was written before.
    pub async fn load(&self) -> Result<Option<TopicSnapshot>, PersistenceError> {
        let json = match fs::read(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: TopicSnapshot = serde_json::from_slice(&json)?;
        tracing::debug!("Loaded {} message(s) from {:?}", snapshot.messages.len(), self.path);

        Ok(Some(snapshot))
    }
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
