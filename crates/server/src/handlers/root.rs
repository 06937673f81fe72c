use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub features: Vec<&'static str>,
}

/// GET / - Service banner.
#[axum::debug_handler]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "gemproxy: OpenAI-compatible API for the Gemini web app",
        version: env!("CARGO_PKG_VERSION"),
        features: vec![
            "client_pooling",
            "auto_refresh",
            "health_monitoring",
            "session_reuse",
            "streaming",
        ],
    })
}
