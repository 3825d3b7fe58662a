//! Conversation storage for amaya.
//!
//! The agent loop owns a conversation while a turn runs; between turns it
//! lives in a [`ConversationStore`]. Two backends are provided:
//! - JSON files, one per conversation (default)
//! - In-memory (for testing)

pub mod error;
pub mod json;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use json::JsonConversationStore;
pub use memory::MemoryConversationStore;

use amaya_provider::{Conversation, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A conversation with its bookkeeping, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Creation time, unix milliseconds.
    pub created: i64,
    /// Last append, unix milliseconds.
    pub updated: i64,
    #[serde(default)]
    pub messages: Conversation,
}

impl ConversationRecord {
    pub(crate) fn new(id: String, title: Option<&str>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            title: title.unwrap_or_default().to_string(),
            created: now,
            updated: now,
            messages: Conversation::new(),
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated = chrono::Utc::now().timestamp_millis();
    }

    /// Summary without the messages.
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created: self.created,
            updated: self.updated,
            message_count: self.messages.len(),
        }
    }
}

/// Listing entry for a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created: i64,
    pub updated: i64,
    pub message_count: usize,
}

/// Persistence for conversations between turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation and return its id.
    async fn create(&self, title: Option<&str>) -> StorageResult<String>;

    /// Load a conversation.
    ///
    /// Returns [`StorageError::NotFound`] if the id is unknown.
    async fn load(&self, id: &str) -> StorageResult<Conversation>;

    /// Append one message to a conversation.
    async fn append(&self, id: &str, message: &Message) -> StorageResult<()>;

    /// List stored conversations, newest first.
    async fn list(&self) -> StorageResult<Vec<ConversationSummary>>;

    /// Remove a conversation. Removing an unknown id is not an error.
    async fn remove(&self, id: &str) -> StorageResult<()>;

    /// Check if a conversation exists.
    async fn exists(&self, id: &str) -> StorageResult<bool> {
        match self.load(id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject ids that could escape the storage directory.
pub(crate) fn validate_id(id: &str) -> StorageResult<()> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id == "."
        || id == ".."
        || id.chars().any(char::is_control)
    {
        return Err(StorageError::invalid_id(format!("{:?}", id)));
    }
    Ok(())
}
