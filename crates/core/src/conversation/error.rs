use thiserror::Error;

/// Errors caused by the shape of a client request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Prompt is {actual} characters long, the limit is {limit}")]
    PromptTooLarge { actual: usize, limit: usize },

    #[error("Request contains no user or assistant messages")]
    EmptyConversation,

    /// The body could not be read as a chat request. `status` is the code
    /// the HTTP layer chose (400, 415 or 422).
    #[error("Invalid request body: {message}")]
    InvalidBody { status: u16, message: String },
}

impl RequestError {
    /// OpenAI-style error type string.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::InvalidApiKey => "invalid_api_key",
            RequestError::PromptTooLarge { .. } => "context_length_exceeded",
            RequestError::EmptyConversation | RequestError::InvalidBody { .. } => {
                "invalid_request_error"
            }
        }
    }
}

/// Maps a [`RequestError`] to an HTTP status code.
pub fn request_error_to_status_code(error: &RequestError) -> u16 {
    match error {
        RequestError::InvalidApiKey => 401,
        RequestError::PromptTooLarge { .. } => 400,
        RequestError::EmptyConversation => 400,
        RequestError::InvalidBody { status, .. } => *status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(request_error_to_status_code(&RequestError::InvalidApiKey), 401);
        assert_eq!(
            request_error_to_status_code(&RequestError::PromptTooLarge {
                actual: 10,
                limit: 5
            }),
            400
        );
        assert_eq!(
            request_error_to_status_code(&RequestError::EmptyConversation),
            400
        );
    }

    #[test]
    fn test_invalid_body_keeps_status() {
        let err = RequestError::InvalidBody {
            status: 415,
            message: "Expected request with `Content-Type: application/json`".to_string(),
        };
        assert_eq!(request_error_to_status_code(&err), 415);
        assert_eq!(err.kind(), "invalid_request_error");
    }

    #[test]
    fn test_prompt_too_large_display() {
        let err = RequestError::PromptTooLarge {
            actual: 12,
            limit: 10,
        };
        assert_eq!(
            err.to_string(),
            "Prompt is 12 characters long, the limit is 10"
        );
        assert_eq!(err.kind(), "context_length_exceeded");
    }
}
