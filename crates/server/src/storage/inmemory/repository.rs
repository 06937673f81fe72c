use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use gemproxy_core::storage::{ConversationRecord, ConversationRepository, Result, StoreStats};

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    conversations: Arc<RwLock<HashMap<String, ConversationRecord>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn get(&self, hash: &str) -> Result<Option<ConversationRecord>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(hash).cloned())
    }

    async fn put(&self, record: &ConversationRecord) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let mut record = record.clone();
        if let Some(existing) = conversations.get(&record.hash) {
            record.created_at = existing.created_at;
        }
        conversations.insert(record.hash.clone(), record);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conversations = self.conversations.read().await;
        Ok(StoreStats {
            entries: conversations.len(),
        })
    }

    async fn prune(&self, max_entries: usize) -> Result<usize> {
        let mut conversations = self.conversations.write().await;
        if conversations.len() <= max_entries {
            return Ok(0);
        }

        let mut by_age: Vec<(String, chrono::DateTime<chrono::Utc>)> = conversations
            .values()
            .map(|r| (r.hash.clone(), r.updated_at))
            .collect();
        by_age.sort_by_key(|(_, updated_at)| *updated_at);

        let excess = conversations.len() - max_entries;
        for (hash, _) in by_age.into_iter().take(excess) {
            conversations.remove(&hash);
        }
        Ok(excess)
    }
}
