//! Authentication handlers

use axum::extract::{Extension, Json};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::extractors::AuthedUser;
use super::models::{AuthResponse, Claims, GoogleIdTokenPayload, MeResponse};
use crate::common::config::SessionConfig;
use crate::common::{safe_email_log, safe_token_log, ApiError, AppState};

/// POST /api/auth/google
/// Exchanges a Google ID token for a session token
///
/// # Request Body
/// ```json
/// {
///   "id_token": "<google id token>"
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "token": "<session jwt>",
///   "user": { ... },
///   "created": true
/// }
/// ```
pub async fn google_auth(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<GoogleIdTokenPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    debug!(
        id_token = %safe_token_log(&payload.id_token),
        "Received Google sign-in request"
    );

    let outcome = state
        .reconciler
        .reconcile(&payload.id_token)
        .await
        .map_err(|failure| {
            if failure.is_authentication_failure() {
                info!(code = failure.code(), "Google sign-in rejected");
            }
            ApiError::from(failure)
        })?;
    let token = issue_session_token(&state.config.session, &outcome.profile.id)?;

    info!(
        user_id = %outcome.profile.id,
        email = %safe_email_log(&outcome.profile.email),
        created = outcome.created,
        "User signed in via Google"
    );

    Ok(Json(AuthResponse {
        token,
        user: outcome.profile,
        created: outcome.created,
    }))
}

/// GET /api/me
/// Returns the current authenticated user's profile
pub async fn me_handler(authed: AuthedUser) -> Result<Json<MeResponse>, ApiError> {
    Ok(Json(MeResponse {
        user: authed.profile,
    }))
}

/// POST /api/auth/logout
/// Sessions are stateless, so logout is handled client-side. This endpoint
/// just confirms the request.
///
/// # Response
/// ```json
/// {
///   "message": "Logout successful"
/// }
/// ```
pub async fn logout_handler(authed: AuthedUser) -> Result<Json<serde_json::Value>, ApiError> {
    info!(user_id = %authed.id, "User logout successful");
    Ok(Json(serde_json::json!({
        "message": "Logout successful"
    })))
}

// ---- Helper Functions ----

/// Issue an HS256 session token for the given store id
pub fn issue_session_token(session: &SessionConfig, user_id: &str) -> Result<String, ApiError> {
    let exp = (Utc::now() + Duration::hours(session.ttl_hours)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(session.secret.as_bytes()),
    )
    .map_err(|e| {
        error!(error = %e, user_id = %user_id, "Session token encoding failed");
        ApiError::InternalServer("Could not create session".to_string())
    })
}

/// Validate a session token and return its claims
pub fn validate_session_token(session: &SessionConfig, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(session.secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        warn!(error = %e, token = %safe_token_log(token), "Session token validation failed");
        ApiError::Unauthorized("Please sign in again".to_string())
    })
}
