//! Removal of model "thinking" output from assistant history.

use std::sync::LazyLock;

use regex::Regex;

use crate::openai::{ChatMessage, MessageContent, Role};

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(\s*<think>.*?</think>\n?)").expect("think-block pattern is valid")
});

/// Removes a leading `<think>…</think>` block and trims the result.
///
/// Returns `None` when the text has no such block.
pub fn strip_think_block(content: &str) -> Option<String> {
    let stripped = THINK_BLOCK.replace(content, "");
    let cleaned = stripped.trim();
    (cleaned != content).then(|| cleaned.to_string())
}

/// Returns the messages with thinking blocks removed from assistant turns.
///
/// Only plain-string assistant content is touched; everything else is
/// returned unchanged.
pub fn sanitize_assistant_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| match (&message.role, &message.content) {
            (Role::Assistant, MessageContent::Text(text)) => match strip_think_block(text) {
                Some(cleaned) => ChatMessage::assistant(cleaned),
                None => message.clone(),
            },
            _ => message.clone(),
        })
        .collect()
}
