use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::CorsConfig,
    handlers::{chat::chat_completions, health::health, models::list_models, root::root},
    state::AppState,
};

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions));

    let router = match cors_layer(&state.config.cors) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .with_state(state)
}

/// Builds the CORS layer, or `None` when CORS is disabled.
///
/// Browsers refuse `*` together with credentials, so a wildcard is answered by
/// mirroring the request instead when credentials are allowed.
fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let wildcard = |values: &[String]| values.iter().any(|v| v == "*");
    let mirror = config.allow_credentials;

    let origins = if wildcard(&config.allow_origins) {
        if mirror {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::from(Any)
        }
    } else {
        AllowOrigin::list(parse_all::<HeaderValue>(&config.allow_origins, "origin"))
    };

    let methods = if wildcard(&config.allow_methods) {
        if mirror {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::from(Any)
        }
    } else {
        AllowMethods::list(parse_all::<Method>(&config.allow_methods, "method"))
    };

    let headers = if wildcard(&config.allow_headers) {
        if mirror {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::from(Any)
        }
    } else {
        AllowHeaders::list(parse_all::<HeaderName>(&config.allow_headers, "header"))
    };

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(config.allow_credentials),
    )
}

fn parse_all<T: std::str::FromStr>(values: &[String], what: &str) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(value = %value, "Ignoring invalid CORS {what}");
                None
            }
        })
        .collect()
}
