// Error handling types for the API

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

use super::failure::Failure;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    NotFound(String),
    InternalServer(String),
    ServiceUnavailable(String),
    BadGateway(String),
    TooManyRequests {
        message: String,
        retry_after: Option<u64>,
    },
    DatabaseError(sqlx::Error),
    ValidationError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad Gateway: {}", msg),
            ApiError::TooManyRequests { message, .. } => {
                write!(f, "Too Many Requests: {}", message)
            }
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut retry_after_header = None;

        let (status, error_message, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::InternalServer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "INTERNAL_SERVER_ERROR",
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, "BAD_GATEWAY"),
            ApiError::TooManyRequests {
                message,
                retry_after,
            } => {
                retry_after_header = retry_after;
                (StatusCode::TOO_MANY_REQUESTS, message, "RATE_LIMITED")
            }
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    "DATABASE_ERROR",
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
        };

        let error_response = ErrorResponse {
            error: error_message,
            code: code.to_string(),
        };

        let mut response = (status, Json(error_response)).into_response();
        if let Some(seconds) = retry_after_header {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Applies the user-visible policy for core failures: authentication
/// problems never carry internal detail, provider credentials are never
/// described, and rate limiting stays distinguishable.
impl From<Failure> for ApiError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::InvalidToken
            | Failure::UntrustedIssuer
            | Failure::ExpiredToken
            | Failure::AudienceMismatch => {
                warn!(code = failure.code(), "Identity verification rejected");
                ApiError::Unauthorized("Please sign in again".to_string())
            }
            Failure::VerificationTimeout | Failure::IssuerUnavailable(_) => {
                warn!(code = failure.code(), error = %failure, "Identity issuer not reachable");
                ApiError::ServiceUnavailable(
                    "Sign-in is temporarily unavailable, please try again".to_string(),
                )
            }
            Failure::PersistenceFailure(detail) => {
                error!(error = %detail, "User profile could not be persisted");
                ApiError::InternalServer("Could not save user profile".to_string())
            }
            Failure::InvalidRequest(msg) => ApiError::ValidationError(msg),
            Failure::ProviderUnavailable(detail) => {
                warn!(error = %detail, "Generation provider unavailable");
                ApiError::ServiceUnavailable("Generation provider unavailable".to_string())
            }
            Failure::ProviderProtocolError(detail) => {
                error!(error = %detail, "Generation provider returned an undecodable body");
                ApiError::BadGateway("Generation provider returned an invalid response".to_string())
            }
            Failure::ProviderAuthError => {
                error!("Generation provider rejected configured credentials");
                ApiError::InternalServer("Generation service is misconfigured".to_string())
            }
            Failure::RateLimited { retry_after } => ApiError::TooManyRequests {
                message: "Generation provider is busy, please retry later".to_string(),
                retry_after,
            },
            Failure::ProviderError { status, payload } => {
                error!(provider_status = status, payload = %payload, "Generation provider error");
                ApiError::BadGateway(format!("Generation provider returned HTTP {}", status))
            }
        }
    }
}
