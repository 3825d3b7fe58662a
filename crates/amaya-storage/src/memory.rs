//! In-memory conversation store for testing.

use crate::{
    validate_id, ConversationRecord, ConversationStore, ConversationSummary, StorageError,
    StorageResult,
};
use amaya_provider::{Conversation, Message};
use amaya_util::{IdPrefix, Identifier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory conversation store.
///
/// Nothing is persisted.
pub struct MemoryConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a conversation under a caller-chosen id.
    pub fn insert(&self, id: &str, conversation: Conversation) -> StorageResult<()> {
        validate_id(id)?;
        let mut record = ConversationRecord::new(id.to_string(), None);
        record.messages = conversation;
        self.records
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?
            .insert(id.to_string(), record);
        Ok(())
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, title: Option<&str>) -> StorageResult<String> {
        let id = Identifier::ascending(IdPrefix::Conversation);
        self.records
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?
            .insert(id.clone(), ConversationRecord::new(id.clone(), title));
        Ok(id)
    }

    async fn load(&self, id: &str) -> StorageResult<Conversation> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        records
            .get(id)
            .map(|r| r.messages.clone())
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn append(&self, id: &str, message: &Message) -> StorageResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?
            .push(message.clone());
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<ConversationSummary>> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        let mut summaries: Vec<_> = records.values().map(ConversationRecord::summary).collect();
        summaries.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.records
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?
            .remove(id);
        Ok(())
    }
}
