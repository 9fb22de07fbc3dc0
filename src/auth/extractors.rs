//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::handlers::validate_session_token;
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::UserProfile;

/// Authenticated user extractor
///
/// Validates the session JWT and loads the user's profile from the store.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
    pub profile: UserProfile,
}

/// Bearer token from the Authorization header. The scheme is matched
/// case-insensitively and a raw token is accepted too.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {
            let rest = &value[6..];
            // "Bearerxyz" is a raw token, not the scheme
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                value
            } else {
                rest.trim()
            }
        }
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(app_state): Extension<Arc<AppState>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let token = bearer_token(&parts.headers).ok_or_else(|| {
            warn!("Authentication failed: missing Authorization header");
            ApiError::Unauthorized("Please sign in again".to_string())
        })?;

        let claims = validate_session_token(&app_state.config.session, token)?;

        match app_state.store.find_by_id(&claims.sub).await? {
            Some(profile) => {
                debug!(
                    user_id = %profile.id,
                    email = %safe_email_log(&profile.email),
                    "User authentication successful via extractor"
                );
                Ok(AuthedUser {
                    id: profile.id.clone(),
                    email: profile.email.clone(),
                    profile,
                })
            }
            None => {
                warn!(user_id = %claims.sub, "Authentication failed: user not found in store");
                Err(ApiError::Unauthorized("Please sign in again".to_string()))
            }
        }
    }
}
