//! # Auth Module
//!
//! Sign-in and session handling:
//! - Google ID token exchange (verify, then find-or-create the user)
//! - Session JWT issue and validation
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;


pub use extractors::AuthedUser;
pub use routes::auth_routes;
