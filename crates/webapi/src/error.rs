//! Error helpers for the web client.

use gemproxy_core::gemini::GeminiError;

pub type Result<T> = std::result::Result<T, GeminiError>;

/// Converts a transport failure into the Gemini error taxonomy.
pub(crate) fn from_reqwest(error: reqwest::Error, context: &str) -> GeminiError {
    if error.is_timeout() {
        GeminiError::Timeout(format!(
            "{context} timed out. If the problem persists, consider raising `gemini.timeout`."
        ))
    } else {
        GeminiError::Api(format!("{context} failed: {error}"))
    }
}

/// Classifies a non-success HTTP status.
pub(crate) fn from_status(status: reqwest::StatusCode, context: &str) -> GeminiError {
    match status.as_u16() {
        401 | 403 => GeminiError::Auth(format!(
            "{context} was rejected with status {status}. The cookies may have expired."
        )),
        _ => GeminiError::Api(format!("{context} failed with status code {status}")),
    }
}

/// Rewrites errors raised while creating a pooled client.
///
/// Authentication failures get a hint about cookie expiry; everything else
/// becomes an initialization error.
pub fn map_factory_error(error: GeminiError) -> GeminiError {
    match error {
        GeminiError::Auth(_) => GeminiError::Auth(
            "Authentication failed. Please check your cookies. SECURE_1PSIDTS may have expired."
                .to_string(),
        ),
        GeminiError::Init(message) => GeminiError::Init(message),
        other => GeminiError::Init(format!("Failed to initialize Gemini client: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_factory_error_auth() {
        let mapped = map_factory_error(GeminiError::Auth("token missing".to_string()));
        assert_eq!(
            mapped,
            GeminiError::Auth(
                "Authentication failed. Please check your cookies. SECURE_1PSIDTS may have expired."
                    .to_string()
            )
        );
    }

    #[test]
    fn test_map_factory_error_other() {
        let mapped = map_factory_error(GeminiError::Api("boom".to_string()));
        assert_eq!(
            mapped,
            GeminiError::Init("Failed to initialize Gemini client: boom".to_string())
        );
    }

    #[test]
    fn test_from_status() {
        assert!(from_status(reqwest::StatusCode::FORBIDDEN, "Init").is_auth());
        assert!(matches!(
            from_status(reqwest::StatusCode::BAD_GATEWAY, "Init"),
            GeminiError::Api(_)
        ));
    }
}
