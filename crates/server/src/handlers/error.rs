use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gemproxy_core::conversation::{request_error_to_status_code, RequestError};
use gemproxy_core::gemini::{gemini_error_to_status_code, GeminiError};
use gemproxy_core::openai::ErrorBody;
use gemproxy_core::storage::{repository_error_to_status_code, RepositoryError};

/// Handler error rendered as the OpenAI error envelope.
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status_and_kind(&self) -> (u16, &'static str) {
        if let Some(e) = self.0.downcast_ref::<GeminiError>() {
            (gemini_error_to_status_code(e), e.kind())
        } else if let Some(e) = self.0.downcast_ref::<RequestError>() {
            (request_error_to_status_code(e), e.kind())
        } else if let Some(e) = self.0.downcast_ref::<RepositoryError>() {
            (repository_error_to_status_code(e), "storage_error")
        } else {
            (500, "internal_server_error")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, kind) = self.status_and_kind();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, kind, "Request failed");
        } else {
            tracing::warn!(error = %self.0, kind, "Request rejected");
        }

        (status, Json(ErrorBody::new(self.0.to_string(), kind))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn render(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_gemini_errors_keep_their_status() {
        let (status, body) = render(GeminiError::UsageLimitExceeded("quota".to_string()).into()).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "usage_limit_exceeded");
        assert_eq!(body["error"]["message"], "quota");
    }

    #[tokio::test]
    async fn test_request_errors_keep_their_status() {
        let (status, body) = render(RequestError::InvalidApiKey.into()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "invalid_api_key");
    }

    #[tokio::test]
    async fn test_unknown_errors_are_internal() {
        let (status, body) = render(anyhow::anyhow!("boom").into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "internal_server_error");
        assert_eq!(body["error"]["message"], "boom");
    }
}
