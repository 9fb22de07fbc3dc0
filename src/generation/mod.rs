//! # Generation Module
//!
//! Authenticated text generation through the configured LLM provider.

pub mod handlers;
pub mod models;
pub mod routes;


pub use routes::generation_routes;
