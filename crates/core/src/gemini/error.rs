use thiserror::Error;

/// Failures talking to the Gemini web app.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeminiError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    UsageLimitExceeded(String),

    #[error("{0}")]
    ModelInvalid(String),

    #[error("{0}")]
    TemporarilyBlocked(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Api(String),

    #[error("{0}")]
    Init(String),
}

impl GeminiError {
    /// OpenAI-style error type string.
    pub fn kind(&self) -> &'static str {
        match self {
            GeminiError::Auth(_) => "auth_error",
            GeminiError::UsageLimitExceeded(_) => "usage_limit_exceeded",
            GeminiError::ModelInvalid(_) => "model_invalid",
            GeminiError::TemporarilyBlocked(_) => "temporarily_blocked",
            GeminiError::Timeout(_) => "timeout_error",
            GeminiError::Api(_) => "api_error",
            GeminiError::Init(_) => "internal_server_error",
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GeminiError::Auth(_))
    }
}

/// Maps a [`GeminiError`] to an HTTP status code.
///
/// ```
/// use gemproxy_core::gemini::{GeminiError, gemini_error_to_status_code};
///
/// assert_eq!(gemini_error_to_status_code(&GeminiError::Timeout("slow".into())), 408);
/// ```
pub fn gemini_error_to_status_code(error: &GeminiError) -> u16 {
    match error {
        GeminiError::Auth(_) => 401,
        GeminiError::UsageLimitExceeded(_) => 429,
        GeminiError::ModelInvalid(_) => 400,
        GeminiError::TemporarilyBlocked(_) => 429,
        GeminiError::Timeout(_) => 408,
        GeminiError::Api(_) => 502,
        GeminiError::Init(_) => 500,
    }
}
