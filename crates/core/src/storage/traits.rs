use async_trait::async_trait;

use super::{ConversationRecord, Result, StoreStats};

/// Persistent store of conversations keyed by their content hash.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Gets a conversation by hash.
    async fn get(&self, hash: &str) -> Result<Option<ConversationRecord>>;

    /// Inserts a conversation, replacing any record with the same hash.
    ///
    /// On replacement `created_at` is preserved.
    async fn put(&self, record: &ConversationRecord) -> Result<()>;

    /// Returns the number of stored conversations.
    async fn stats(&self) -> Result<StoreStats>;

    /// Deletes the least recently updated conversations until at most
    /// `max_entries` remain. Returns the number removed.
    async fn prune(&self, max_entries: usize) -> Result<usize>;
}
