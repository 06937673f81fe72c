use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gemini::ChatMetadata;
use crate::openai::ChatMessage;

/// A stored conversation and the Gemini chat it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub hash: String,
    pub credential_id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub metadata: ChatMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Creates a record with both timestamps set to `now`.
    pub fn new(
        hash: impl Into<String>,
        credential_id: impl Into<String>,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        metadata: ChatMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            hash: hash.into(),
            credential_id: credential_id.into(),
            model: model.into(),
            messages,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Store summary reported by `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
}
