//! Streaming chunk construction (pure).
//!
//! The upstream reply arrives complete, so streaming is a presentation
//! concern: the text is cut into small pieces and each piece becomes one
//! `chat.completion.chunk` frame.

use super::types::{ChatCompletionChunk, ChunkChoice, Delta, Role};

/// Splits `text` into pieces of at most `max_chars` characters.
///
/// Splitting is done on `char` boundaries so multi-byte characters are never
/// cut. A `max_chars` of zero is treated as one.
pub fn split_reply(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Builds every frame of a streamed completion, including the final
/// `finish_reason: "stop"` frame. The `[DONE]` sentinel is not a chunk and is
/// left to the transport.
pub fn completion_chunks(
    id: &str,
    created: i64,
    model: &str,
    reply: &str,
    max_chars: usize,
) -> Vec<ChatCompletionChunk> {
    let frame = |delta: Delta, finish_reason: Option<String>| ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };

    let pieces = split_reply(reply, max_chars);
    let mut chunks = Vec::with_capacity(pieces.len() + 1);

    for (i, piece) in pieces.into_iter().enumerate() {
        let role = (i == 0).then_some(Role::Assistant);
        chunks.push(frame(
            Delta {
                role,
                content: Some(piece),
            },
            None,
        ));
    }

    let final_delta = if chunks.is_empty() {
        Delta {
            role: Some(Role::Assistant),
            content: None,
        }
    } else {
        Delta::default()
    };
    chunks.push(frame(final_delta, Some("stop".to_string())));

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reply_exact_and_remainder() {
        assert_eq!(split_reply("abcdef", 2), vec!["ab", "cd", "ef"]);
        assert_eq!(split_reply("abcde", 2), vec!["ab", "cd", "e"]);
        assert!(split_reply("", 4).is_empty());
    }

    #[test]
    fn test_split_reply_respects_char_boundaries() {
        let pieces = split_reply("héllo wörld", 3);
        assert_eq!(pieces.concat(), "héllo wörld");
        assert!(pieces.iter().all(|p| p.chars().count() <= 3));
    }

    #[test]
    fn test_split_reply_zero_is_one() {
        assert_eq!(split_reply("abc", 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_completion_chunks_shape() {
        let chunks = completion_chunks("chatcmpl-1", 42, "gpt-4", "Hello!", 4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("Hell"));
        assert_eq!(chunks[1].choices[0].delta.role, None);
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("o!"));

        let last = chunks.last().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.choices[0].delta, Delta::default());
        assert!(chunks
            .iter()
            .all(|c| c.object == "chat.completion.chunk" && c.id == "chatcmpl-1"));
    }

    #[test]
    fn test_completion_chunks_empty_reply() {
        let chunks = completion_chunks("id", 0, "m", "", 4);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
