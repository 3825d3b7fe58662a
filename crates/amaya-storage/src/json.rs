//! JSON file-based conversation store.
//!
//! Each conversation is one file: `<base>/conversation/<id>.json`.

use crate::{
    validate_id, ConversationRecord, ConversationStore, ConversationSummary, StorageError,
    StorageResult,
};
use amaya_provider::{Conversation, Message};
use amaya_util::{IdPrefix, Identifier};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

const CONVERSATION_DIR: &str = "conversation";

/// JSON file-based conversation store.
pub struct JsonConversationStore {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonConversationStore {
    /// Create a new store at the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store at the default data directory.
    pub fn default_location() -> Option<Self> {
        amaya_util::path::data_dir().map(|p| Self::new(p.join("data")))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        validate_id(id)?;
        Ok(self
            .base_path
            .join(CONVERSATION_DIR)
            .join(format!("{}.json", id)))
    }

    async fn read_record(&self, id: &str) -> StorageResult<ConversationRecord> {
        let path = self.record_path(id)?;
        debug!(path = %path.display(), "Reading conversation");

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(id))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write_record(&self, record: &ConversationRecord) -> StorageResult<()> {
        let path = self.record_path(&record.id)?;
        debug!(path = %path.display(), "Writing conversation");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(record)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn create(&self, title: Option<&str>) -> StorageResult<String> {
        let id = Identifier::ascending(IdPrefix::Conversation);
        let _guard = self.write_lock.lock().await;
        self.write_record(&ConversationRecord::new(id.clone(), title))
            .await?;
        Ok(id)
    }

    async fn load(&self, id: &str) -> StorageResult<Conversation> {
        Ok(self.read_record(id).await?.messages)
    }

    async fn append(&self, id: &str, message: &Message) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record(id).await?;
        record.push(message.clone());
        self.write_record(&record).await
    }

    async fn list(&self) -> StorageResult<Vec<ConversationSummary>> {
        let dir = self.base_path.join(CONVERSATION_DIR);
        let mut summaries = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                summaries.push(self.read_record(id).await?.summary());
            }
        }

        summaries.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        let path = self.record_path(id)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
