// src/services/llm_proxy.rs
//! Provider-agnostic text generation proxy
//!
//! One request in, one normalized result out. The proxy validates the
//! prompt, resolves the tier, translates to the configured provider's wire
//! schema, maps HTTP failures onto `Failure`, and extracts the text with
//! `extraction::extract_text`. It never retries: callers own backoff.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::extraction::extract_text;
use super::provider_transport::{ProviderTransport, TransportError};
use super::tiers::{Tier, TierTable};
use crate::common::Failure;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::OpenAi => "https://api.openai.com",
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "v1/messages",
            ProviderKind::OpenAi => "v1/chat/completions",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("LLM_PROVIDER '{}' is not supported", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Anthropic => f.write_str("anthropic"),
            ProviderKind::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_prompt_chars: usize,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    /// Generated text. Empty when the provider reply matched no known shape.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub tier: Tier,
    pub model: String,
}

pub struct GenerationProxy {
    config: Arc<ProviderConfig>,
    tiers: Arc<TierTable>,
    transport: Arc<dyn ProviderTransport>,
}

impl GenerationProxy {
    pub fn new(
        config: Arc<ProviderConfig>,
        tiers: Arc<TierTable>,
        transport: Arc<dyn ProviderTransport>,
    ) -> Self {
        Self {
            config,
            tiers,
            transport,
        }
    }

    pub async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, Failure> {
        self.validate(req)?;

        let (tier, fell_back) = Tier::resolve(req.tier.as_deref());
        if fell_back {
            debug!(requested_tier = ?req.tier, tier = %tier, "Tier not recognized, using default");
        }
        let profile = self.tiers.profile(tier);

        let url = format!("{}/{}", self.config.base_url, self.config.kind.endpoint());
        let headers = self.headers();
        let body = self.wire_body(&req.prompt, tier);

        debug!(
            provider = %self.config.kind,
            tier = %tier,
            model = %profile.model,
            prompt_chars = req.prompt.chars().count(),
            "Sending generation request"
        );

        let reply = self
            .transport
            .post(&url, &headers, &body)
            .await
            .map_err(|e| {
                warn!(error = %e, provider = %self.config.kind, "Provider transport failed");
                match e {
                    TransportError::Timeout => {
                        Failure::ProviderUnavailable("provider request timed out".to_string())
                    }
                    other => Failure::ProviderUnavailable(other.to_string()),
                }
            })?;

        let decoded = serde_json::from_slice::<Value>(&reply.body);

        if !(200..300).contains(&reply.status) {
            let payload = decoded.unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&reply.body).into_owned())
            });
            return Err(map_status(reply.status, reply.retry_after, payload));
        }

        let envelope =
            decoded.map_err(|e| Failure::ProviderProtocolError(e.to_string()))?;

        let text = extract_text(&envelope);
        if text.is_empty() {
            warn!(
                provider = %self.config.kind,
                model = %profile.model,
                "Provider reply matched no known shape, returning empty text"
            );
        }

        let usage = envelope.get("usage").cloned();
        info!(
            tier = %tier,
            model = %profile.model,
            text_chars = text.chars().count(),
            "Generation completed"
        );

        Ok(GenerationResult {
            text,
            usage,
            tier,
            model: profile.model.clone(),
        })
    }

    fn validate(&self, req: &GenerationRequest) -> Result<(), Failure> {
        if req.prompt.trim().is_empty() {
            return Err(Failure::InvalidRequest("prompt must not be empty".to_string()));
        }
        let chars = req.prompt.chars().count();
        if chars > self.config.max_prompt_chars {
            return Err(Failure::InvalidRequest(format!(
                "prompt is {} characters, the limit is {}",
                chars, self.config.max_prompt_chars
            )));
        }
        Ok(())
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        match self.config.kind {
            ProviderKind::Anthropic => vec![
                ("x-api-key", self.config.api_key.clone()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            ProviderKind::OpenAi => vec![(
                "authorization",
                format!("Bearer {}", self.config.api_key),
            )],
        }
    }

    /// Single-turn user message plus model and limits. Both supported
    /// providers accept the same shape for this subset.
    fn wire_body(&self, prompt: &str, tier: Tier) -> Value {
        let profile = self.tiers.profile(tier);
        json!({
            "model": profile.model,
            "max_tokens": profile.max_tokens,
            "temperature": profile.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        })
    }
}

fn map_status(status: u16, retry_after: Option<u64>, payload: Value) -> Failure {
    match status {
        429 => Failure::RateLimited { retry_after },
        401 => Failure::ProviderAuthError,
        400 => {
            let message = payload
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(Value::as_str)
                .unwrap_or("provider rejected the request")
                .to_string();
            Failure::InvalidRequest(message)
        }
        _ => Failure::ProviderError { status, payload },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("anthropic".parse::<ProviderKind>(), Ok(ProviderKind::Anthropic));
        assert_eq!(" OpenAI ".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert!("cohere".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_map_status_codes() {
        assert!(matches!(
            map_status(429, Some(3), Value::Null),
            Failure::RateLimited { retry_after: Some(3) }
        ));
        assert!(matches!(map_status(401, None, Value::Null), Failure::ProviderAuthError));
        assert!(matches!(
            map_status(503, None, json!({"error": "overloaded"})),
            Failure::ProviderError { status: 503, .. }
        ));
    }

    #[test]
    fn test_bad_request_message_is_taken_from_payload() {
        let failure = map_status(
            400,
            None,
            json!({"error": {"type": "invalid_request_error", "message": "max_tokens too large"}}),
        );
        match failure {
            Failure::InvalidRequest(message) => assert_eq!(message, "max_tokens too large"),
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config = ProviderConfig {
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            api_key: "sk-ant-secret".to_string(),
            timeout: Duration::from_secs(30),
            max_prompt_chars: 100,
        };
        assert!(!format!("{:?}", config).contains("sk-ant-secret"));
    }
}
