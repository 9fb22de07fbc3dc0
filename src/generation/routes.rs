//! Generation routes

use axum::{routing::post, Router};

use super::handlers;

/// Creates and returns the generation router
///
/// # Routes
/// - `POST /api/generate` - Generate text for the signed-in user
pub fn generation_routes() -> Router {
    Router::new().route("/api/generate", post(handlers::generate_handler))
}
