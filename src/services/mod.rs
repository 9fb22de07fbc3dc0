// src/services/mod.rs
//
// Core services: identity verification and reconciliation, the generation
// proxy, and the inbound rate limiter.

pub mod extraction;
pub mod identity;
pub mod llm_proxy;
pub mod provider_transport;
pub mod rate_limit;
pub mod tiers;
pub mod token_verifier;
pub mod user_store;

#[cfg(test)]
pub(crate) mod tests;

// Re-export commonly used types for convenience
pub use identity::IdentityReconciler;
pub use llm_proxy::{GenerationProxy, GenerationRequest, GenerationResult};
pub use rate_limit::RateLimitService;
pub use token_verifier::TokenVerifier;
pub use user_store::{SqliteUserStore, UserProfile, UserStore};
