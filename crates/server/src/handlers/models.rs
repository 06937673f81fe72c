use axum::Json;
use gemproxy_core::model::available_models;
use gemproxy_core::openai::ModelList;

/// GET /v1/models - Model names accepted by the chat endpoint.
#[axum::debug_handler]
pub async fn list_models() -> Json<ModelList> {
    Json(available_models())
}
