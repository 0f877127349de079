use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::HistoryError;
use crate::format::Message;

type Transcripts = HashMap<String, Vec<Message>>;

/// Per-conversation message history, optionally mirrored to a JSON file.
///
/// The file holds a single object mapping conversation id to its messages
/// and is rewritten in full on every [`persist`](Self::persist).
#[derive(Debug, Default)]
pub struct HistoryStore {
    transcripts: RwLock<Transcripts>,
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// Create an in-memory store with no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to `path`
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            transcripts: RwLock::new(HashMap::new()),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append messages to a conversation, creating it if absent.
    /// The empty id means "untracked" and is ignored.
    pub async fn append(&self, conversation_id: &str, messages: &[Message]) {
        if conversation_id.is_empty() {
            return;
        }
        let mut transcripts = self.transcripts.write().await;
        transcripts
            .entry(conversation_id.to_string())
            .or_default()
            .extend_from_slice(messages);
    }

    /// Copy of one conversation's messages, oldest first
    pub async fn read(&self, conversation_id: &str) -> Vec<Message> {
        let transcripts = self.transcripts.read().await;
        transcripts.get(conversation_id).cloned().unwrap_or_default()
    }

    /// Copy of every conversation
    pub async fn snapshot(&self) -> HashMap<String, Vec<Message>> {
        self.transcripts.read().await.clone()
    }

    pub async fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.transcripts.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.transcripts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transcripts.read().await.is_empty()
    }

    /// Drop one conversation. Does not touch the file.
    pub async fn flush(&self, conversation_id: &str) {
        if self.transcripts.write().await.remove(conversation_id).is_some() {
            debug!("Flushed history for conversation {}", conversation_id);
        }
    }

    /// Drop every conversation. Does not touch the file.
    pub async fn reset_all(&self) {
        *self.transcripts.write().await = HashMap::new();
        debug!("Reset all conversation history");
    }

    /// Write the whole map to the configured file, replacing its contents.
    ///
    /// Holds the write lock until the file is written so appends and other
    /// persists wait for a consistent snapshot to land.
    pub async fn persist(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let transcripts = self.transcripts.write().await;
        let data = serde_json::to_vec(&*transcripts)?;
        tokio::fs::write(path, data).await?;

        debug!(
            "Persisted {} conversations to {}",
            transcripts.len(),
            path.display()
        );
        Ok(())
    }

    /// Replace the in-memory map with the file's contents.
    /// A missing file is the first-run case and leaves the store untouched.
    pub async fn load(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history file at {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let loaded: Transcripts = serde_json::from_slice(&data)?;
        let count = loaded.len();
        *self.transcripts.write().await = loaded;

        debug!("Loaded {} conversations from {}", count, path.display());
        Ok(())
    }
}
