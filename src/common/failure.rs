// src/common/failure.rs
//! Typed failures returned by the identity and generation core
//!
//! Every core operation returns `Result<_, Failure>`. The HTTP layer turns
//! these into responses through `From<Failure> for ApiError`, which is where
//! the user-visible wording lives.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("identity assertion is malformed")]
    InvalidToken,

    #[error("identity assertion was not signed by a trusted issuer")]
    UntrustedIssuer,

    #[error("identity assertion has expired")]
    ExpiredToken,

    #[error("identity assertion audience does not match this service")]
    AudienceMismatch,

    #[error("identity verification timed out")]
    VerificationTimeout,

    #[error("identity issuer keys unavailable: {0}")]
    IssuerUnavailable(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider response could not be decoded: {0}")]
    ProviderProtocolError(String),

    #[error("provider rejected the configured credentials")]
    ProviderAuthError,

    #[error("provider rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider returned HTTP {status}")]
    ProviderError { status: u16, payload: Value },
}

impl Failure {
    /// True for failures that mean "the caller must sign in again".
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Failure::InvalidToken
                | Failure::UntrustedIssuer
                | Failure::ExpiredToken
                | Failure::AudienceMismatch
        )
    }

    /// Stable machine-readable code, used in logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Failure::InvalidToken => "INVALID_TOKEN",
            Failure::UntrustedIssuer => "UNTRUSTED_ISSUER",
            Failure::ExpiredToken => "EXPIRED_TOKEN",
            Failure::AudienceMismatch => "AUDIENCE_MISMATCH",
            Failure::VerificationTimeout => "VERIFICATION_TIMEOUT",
            Failure::IssuerUnavailable(_) => "ISSUER_UNAVAILABLE",
            Failure::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Failure::InvalidRequest(_) => "INVALID_REQUEST",
            Failure::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Failure::ProviderProtocolError(_) => "PROVIDER_PROTOCOL_ERROR",
            Failure::ProviderAuthError => "PROVIDER_AUTH_ERROR",
            Failure::RateLimited { .. } => "RATE_LIMITED",
            Failure::ProviderError { .. } => "PROVIDER_ERROR",
        }
    }
}

impl From<sqlx::Error> for Failure {
    fn from(e: sqlx::Error) -> Self {
        Failure::PersistenceFailure(e.to_string())
    }
}
