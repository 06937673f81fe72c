//! Gemini web app protocol: endpoints, payloads, response parsing and the
//! error taxonomy.

mod error;
mod protocol;
mod retry;

pub use error::{gemini_error_to_status_code, GeminiError};
pub use protocol::{
    build_request_payload, extract_access_token, extract_cookie, parse_generate_response,
    parse_upload_response, ChatMetadata, ModelOutput, UploadedFile, GENERATE_URL, INIT_URL,
    ORIGIN, ROTATE_COOKIES_BODY, ROTATE_COOKIES_URL, UPLOAD_PUSH_ID, UPLOAD_URL,
};
pub use retry::retry_backoff;
