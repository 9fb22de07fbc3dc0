// rate_limit_middleware.rs
use crate::auth::extractors::bearer_token;
use crate::auth::handlers::validate_session_token;
use crate::common::{ApiError, AppState};
use crate::services::rate_limit::RateLimitResult;
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract IP address from request. Forwarding headers are client supplied,
/// so they are only read when a trusted proxy sets them.
fn extract_ip_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> Option<String> {
    if !trust_proxy_headers {
        return connect_info.map(|info| info.0.ip().to_string());
    }

    // Proxied requests: first hop in X-Forwarded-For, then X-Real-IP
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    connect_info.map(|info| info.0.ip().to_string())
}

/// Rate limit key: the session's user id when a valid session token is
/// present, otherwise the client IP. Invalid tokens count against the IP so
/// they cannot mint fresh keys.
fn rate_limit_key(
    state: &AppState,
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    let user = bearer_token(headers)
        .and_then(|token| validate_session_token(&state.config.session, token).ok())
        .map(|claims| format!("user:{}", claims.sub));

    user.or_else(|| {
        extract_ip_address(headers, connect_info, state.config.trust_proxy_headers)
            .map(|ip| format!("ip:{}", ip))
    })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    Extension(state): Extension<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let key = rate_limit_key(&state, request.headers(), connect_info.as_ref());
    let path = request.uri().path().to_string();

    match state.rate_limiter.check(&key).await {
        RateLimitResult::Allowed => {
            debug!(key = %key, path = %path, "Request allowed by rate limiter");
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            warn!(
                key = %key,
                path = %path,
                retry_after = retry_after,
                "Request blocked by rate limiter"
            );
            ApiError::TooManyRequests {
                message: "Rate limit exceeded. Please try again later.".to_string(),
                retry_after: Some(retry_after),
            }
            .into_response()
        }
    }
}
