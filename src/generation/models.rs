//! Generation request/response models

use serde::Serialize;
use serde_json::Value;

use crate::services::tiers::Tier;
use crate::services::GenerationResult;

pub use crate::services::GenerationRequest;

/// Response body for `POST /api/generate`
#[derive(Serialize, Debug)]
pub struct GenerationResponse {
    /// Correlation id, also present in the gateway logs
    pub id: String,
    pub text: String,
    pub usage: Option<Value>,
    pub tier: Tier,
    pub model: String,
}

impl GenerationResponse {
    pub fn new(id: String, result: GenerationResult) -> Self {
        Self {
            id,
            text: result.text,
            usage: result.usage,
            tier: result.tier,
            model: result.model,
        }
    }
}
