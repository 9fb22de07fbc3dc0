//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/google` - Exchange a Google ID token for a session
/// - `POST /api/auth/logout` - Logout (client-side token removal)
/// - `GET /api/me` - Get current user information
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/google", post(handlers::google_auth))
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route("/api/me", get(handlers::me_handler))
}
