//! `/health` reports the client pool and the conversation store.

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use gemproxy_webapi::PoolStats;
use serde::Serialize;

use crate::{state::AppState, storage::BACKEND_NAME};

#[derive(Debug, Serialize)]
pub struct StorageStatus {
    pub backend: &'static str,
    /// `None` when the store could not be queried.
    pub entries: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub client_pool: PoolStats,
    pub storage: StorageStatus,
}

/// GET /health - Always 200 while the server accepts connections.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let entries = match state.conversations.stats().await {
        Ok(stats) => Some(stats.entries),
        Err(e) => {
            tracing::warn!(error = %e, "Conversation store stats failed");
            None
        }
    };

    Json(HealthReport {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        version: env!("CARGO_PKG_VERSION"),
        client_pool: state.pool.stats().await,
        storage: StorageStatus {
            backend: BACKEND_NAME,
            entries,
        },
    })
}
