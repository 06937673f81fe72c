//! Flattening of OpenAI chat history into a single Gemini prompt.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::openai::{ChatMessage, ContentPart, MessageContent, Role};

use super::RequestError;

/// Text returned to the client when Gemini answers with nothing.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "Empty response received from Gemini. Please try again.";

/// A decoded inline image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Result of [`prepare_conversation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedConversation {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    /// Non-fatal problems found while preparing (e.g. undecodable images).
    pub warnings: Vec<String>,
}

/// Decodes a `data:image/<subtype>;base64,<payload>` URL.
///
/// Returns the MIME type and the raw bytes, or a description of what was
/// wrong with the URL.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), String> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| "data URL has no payload".to_string())?;

    let meta = header
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URL".to_string())?;

    let mime_type = meta
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("image/png")
        .to_string();

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {e}"))?;

    Ok((mime_type, data))
}

fn extension_for(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Builds the prompt and attachment list from chat messages.
///
/// Only `user` and `assistant` turns contribute. Text parts of a multi-part
/// message are joined with a space; turns are joined with a newline. Inline
/// `data:image` URLs become attachments; remote image URLs are ignored.
pub fn prepare_conversation(messages: &[ChatMessage]) -> PreparedConversation {
    let mut prepared = PreparedConversation::default();
    let mut turns = Vec::new();

    for message in messages {
        if !matches!(message.role, Role::User | Role::Assistant) {
            continue;
        }

        match &message.content {
            MessageContent::Text(text) => turns.push(text.clone()),
            MessageContent::Parts(parts) => {
                let mut texts = Vec::new();

                for part in parts {
                    match part {
                        ContentPart::Text { text } => texts.push(text.as_str()),
                        ContentPart::ImageUrl { image_url } => {
                            if !image_url.url.starts_with("data:image") {
                                continue;
                            }
                            match decode_data_url(&image_url.url) {
                                Ok((mime_type, data)) => {
                                    let index = prepared.attachments.len() + 1;
                                    prepared.attachments.push(Attachment {
                                        file_name: format!(
                                            "image_{index}.{}",
                                            extension_for(&mime_type)
                                        ),
                                        mime_type,
                                        data,
                                    });
                                }
                                Err(reason) => prepared
                                    .warnings
                                    .push(format!("Failed to process image: {reason}")),
                            }
                        }
                        ContentPart::Unsupported => {}
                    }
                }

                if !texts.is_empty() {
                    turns.push(texts.join(" "));
                }
            }
        }
    }

    prepared.prompt = turns.join("\n");
    prepared
}

/// Rejects prompts longer than `limit` characters.
pub fn ensure_within_limit(prompt: &str, limit: usize) -> Result<(), RequestError> {
    let actual = prompt.chars().count();
    if actual > limit {
        return Err(RequestError::PromptTooLarge { actual, limit });
    }
    Ok(())
}

/// Replaces a blank reply with [`EMPTY_REPLY_PLACEHOLDER`].
pub fn normalize_reply(reply: &str) -> String {
    if reply.trim().is_empty() {
        EMPTY_REPLY_PLACEHOLDER.to_string()
    } else {
        reply.to_string()
    }
}
