use sha2::{Digest, Sha256};

use crate::openai::ChatMessage;

/// Hashes a conversation for session lookup.
///
/// The digest covers the credential id, the model name and every message in
/// order. Messages are encoded as JSON with sorted keys so that the same
/// conversation always produces the same hash.
pub fn hash_conversation(credential_id: &str, model: &str, messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential_id.as_bytes());
    hasher.update(model.as_bytes());

    for message in messages {
        // serde_json::Value keeps object keys in a BTreeMap.
        let canonical = serde_json::to_value(message)
            .map(|value| value.to_string())
            .unwrap_or_default();
        hasher.update(canonical.as_bytes());
    }

    hex::encode(hasher.finalize())
}
