//! Continuing stored Gemini chats.
//!
//! When a request's history extends a conversation this server already
//! answered, only the new messages are sent, together with the stored chat
//! metadata. The store is best effort: its failures are logged and never
//! fail a request.

use chrono::Utc;
use gemproxy_core::conversation::sanitize_assistant_messages;
use gemproxy_core::gemini::ChatMetadata;
use gemproxy_core::openai::ChatMessage;
use gemproxy_core::session::{candidate_prefixes, hash_conversation, SessionMatch};
use gemproxy_core::storage::{ConversationRecord, ConversationRepository};

/// Looks for the longest stored prefix of `messages` under any credential.
pub async fn find_reusable_session(
    repo: &dyn ConversationRepository,
    model: &str,
    messages: &[ChatMessage],
    credential_ids: &[String],
) -> Option<SessionMatch> {
    for len in candidate_prefixes(messages) {
        let prefix = &messages[..len];

        for credential_id in credential_ids {
            let hash = hash_conversation(credential_id, model, prefix);
            match repo.get(&hash).await {
                Ok(Some(record)) if !record.metadata.is_empty() => {
                    tracing::debug!(
                        credential = %credential_id,
                        prefix_len = len,
                        "Reusing stored Gemini chat"
                    );
                    return Some(SessionMatch {
                        record,
                        remaining: messages[len..].to_vec(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Conversation lookup failed");
                }
            }
        }
    }

    None
}

/// Stores `messages` followed by `reply` so a later request can continue it.
pub async fn store_conversation(
    repo: &dyn ConversationRepository,
    max_entries: usize,
    credential_id: &str,
    model: &str,
    messages: &[ChatMessage],
    reply: &str,
    metadata: ChatMetadata,
) {
    if metadata.is_empty() {
        return;
    }

    let mut full = messages.to_vec();
    full.push(ChatMessage::assistant(reply));
    // Clients echo the reply back sanitized; store it the same way.
    let full = sanitize_assistant_messages(&full);

    let hash = hash_conversation(credential_id, model, &full);
    let record = ConversationRecord::new(hash, credential_id, model, full, metadata, Utc::now());

    if let Err(e) = repo.put(&record).await {
        tracing::warn!(error = %e, "Failed to store conversation");
        return;
    }

    match repo.prune(max_entries).await {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, "Pruned stored conversations"),
        Err(e) => tracing::warn!(error = %e, "Failed to prune stored conversations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRepository;

    fn metadata() -> ChatMetadata {
        ChatMetadata {
            cid: Some("c_1".to_string()),
            rid: Some("r_1".to_string()),
            rcid: Some("rc_1".to_string()),
        }
    }

    fn credentials() -> Vec<String> {
        vec!["first".to_string(), "second".to_string()]
    }

    #[tokio::test]
    async fn test_stored_reply_is_found_on_next_turn() {
        let repo = InMemoryRepository::new();
        let history = vec![ChatMessage::user("Hi")];

        store_conversation(&repo, 10, "second", "gemini-2.5-flash", &history, "Hello!", metadata())
            .await;

        let next = vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("How are you?"),
        ];
        let found = find_reusable_session(&repo, "gemini-2.5-flash", &next, &credentials())
            .await
            .expect("session should be found");

        assert_eq!(found.record.credential_id, "second");
        assert_eq!(found.record.metadata, metadata());
        assert_eq!(found.remaining, vec![ChatMessage::user("How are you?")]);
    }

    #[tokio::test]
    async fn test_other_model_does_not_match() {
        let repo = InMemoryRepository::new();
        store_conversation(
            &repo,
            10,
            "first",
            "gemini-2.5-flash",
            &[ChatMessage::user("Hi")],
            "Hello!",
            metadata(),
        )
        .await;

        let next = vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Again"),
        ];
        let found = find_reusable_session(&repo, "gemini-2.5-pro", &next, &credentials()).await;

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_empty_metadata_is_not_stored() {
        let repo = InMemoryRepository::new();
        store_conversation(
            &repo,
            10,
            "first",
            "gemini-2.5-flash",
            &[ChatMessage::user("Hi")],
            "Hello!",
            ChatMetadata::default(),
        )
        .await;

        assert_eq!(repo.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_store_prunes_to_max_entries() {
        let repo = InMemoryRepository::new();
        for i in 0..3 {
            store_conversation(
                &repo,
                2,
                "first",
                "gemini-2.5-flash",
                &[ChatMessage::user(format!("question {i}"))],
                "answer",
                metadata(),
            )
            .await;
        }

        assert_eq!(repo.stats().await.unwrap().entries, 2);
    }
}
