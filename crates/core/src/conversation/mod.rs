mod error;
mod prepare;
mod sanitize;

pub use error::{request_error_to_status_code, RequestError};
pub use prepare::{
    decode_data_url, ensure_within_limit, normalize_reply, prepare_conversation, Attachment,
    PreparedConversation, EMPTY_REPLY_PLACEHOLDER,
};
pub use sanitize::{sanitize_assistant_messages, strip_think_block};
