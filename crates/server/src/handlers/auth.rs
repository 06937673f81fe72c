//! Bearer API key check for the OpenAI endpoints.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use gemproxy_core::conversation::RequestError;

use crate::{handlers::AppError, state::AppState};

/// Proof that the request carried the configured API key.
///
/// Every request passes when no key is configured.
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(state.config.server.api_key.as_deref(), header)?;
        Ok(ApiKey)
    }
}

/// Compares an `Authorization` header against the expected key.
pub fn authorize(expected: Option<&str>, header: Option<&str>) -> Result<(), RequestError> {
    let Some(expected) = expected.filter(|key| !key.is_empty()) else {
        return Ok(());
    };

    match header.and_then(|value| value.strip_prefix("Bearer ")) {
        Some(token) if token == expected => Ok(()),
        _ => Err(RequestError::InvalidApiKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_key_configured_allows_everything() {
        assert!(authorize(None, None).is_ok());
        assert!(authorize(Some(""), Some("Bearer anything")).is_ok());
    }

    #[test]
    fn test_matching_bearer_token() {
        assert!(authorize(Some("sk-1"), Some("Bearer sk-1")).is_ok());
    }

    #[test]
    fn test_rejects_missing_or_wrong_token() {
        assert_eq!(authorize(Some("sk-1"), None), Err(RequestError::InvalidApiKey));
        assert_eq!(
            authorize(Some("sk-1"), Some("Bearer sk-2")),
            Err(RequestError::InvalidApiKey)
        );
        assert_eq!(authorize(Some("sk-1"), Some("sk-1")), Err(RequestError::InvalidApiKey));
    }
}
