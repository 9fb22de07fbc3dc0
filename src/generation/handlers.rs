//! Generation handlers

use axum::extract::{Extension, Json};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::models::{GenerationRequest, GenerationResponse};
use crate::auth::AuthedUser;
use crate::common::{generate_generation_id, ApiError, AppState};

/// POST /api/generate
/// Generates text for the authenticated user
///
/// # Request Body
/// ```json
/// {
///   "prompt": "Write a haiku about the sea",
///   "tier": "standard"
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "id": "G_8Q2M4KX7TR",
///   "text": "...",
///   "usage": { ... },
///   "tier": "standard",
///   "model": "claude-3-5-sonnet-latest"
/// }
/// ```
pub async fn generate_handler(
    Extension(state): Extension<Arc<AppState>>,
    authed: AuthedUser,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let id = generate_generation_id();
    let span = tracing::info_span!("generation", generation_id = %id, user_id = %authed.id);

    async move {
        let result = state.proxy.generate(&payload).await.map_err(|failure| {
            warn!(code = failure.code(), "Generation failed");
            ApiError::from(failure)
        })?;

        info!(tier = %result.tier, model = %result.model, "Generation served");
        Ok(Json(GenerationResponse::new(id, result)))
    }
    .instrument(span)
    .await
}
