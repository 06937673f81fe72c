use crate::openai::{ChatMessage, Role};
use crate::storage::ConversationRecord;

/// A stored conversation that the current request extends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMatch {
    pub record: ConversationRecord,
    /// Messages after the stored prefix, still to be sent.
    pub remaining: Vec<ChatMessage>,
}

/// Prefix lengths worth looking up, longest first.
///
/// A prefix is a candidate when it has at least two messages, leaves at
/// least one message to send, and ends with an `assistant` or `system` turn.
pub fn candidate_prefixes(messages: &[ChatMessage]) -> Vec<usize> {
    if messages.len() < 2 {
        return Vec::new();
    }

    (2..messages.len())
        .rev()
        .filter(|&len| matches!(messages[len - 1].role, Role::Assistant | Role::System))
        .collect()
}
