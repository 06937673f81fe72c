//! JSON body extractor that rejects with the OpenAI error envelope.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use gemproxy_core::conversation::RequestError;

use crate::handlers::AppError;

/// Like [`Json`], but a malformed body becomes a [`RequestError`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(RequestError::InvalidBody {
                status: rejection.status().as_u16(),
                message: rejection.body_text(),
            }
            .into()),
        }
    }
}
