// src/app.rs
//! Router composition and cross-cutting layers

use axum::{
    extract::Extension,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth;
use crate::common::{ApiError, AppState};
use crate::generation;
use crate::rate_limit_middleware::rate_limit_middleware;

/// Builds the full application router around a shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .merge(auth::auth_routes())
        .merge(generation::generation_routes())
        .fallback(fallback_handler)
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        .layer(middleware::from_fn(rate_limit_middleware))
        .layer(Extension(state))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| {
            // credentialed CORS cannot carry a wildcard origin
            let wildcard = origin.as_str() == "*";
            if wildcard {
                warn!("Ignoring wildcard CORS origin");
            }
            !wildcard
        })
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

/// GET /health
/// Liveness plus a database round trip
pub async fn health_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn fallback_handler() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}
