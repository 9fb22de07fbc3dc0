// src/common/config.rs
//! Startup configuration
//!
//! Everything is read from the environment exactly once and never mutated
//! afterwards. Handlers and services receive it behind an `Arc`.

use anyhow::bail;
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::services::llm_proxy::{ProviderConfig, ProviderKind};
use crate::services::rate_limit::RateLimitConfig;
use crate::services::tiers::{Tier, TierTable};
use crate::services::token_verifier::{IdentityConfig, GOOGLE_ISSUERS, GOOGLE_JWKS_URL};

const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub database_url: String,
    pub port: u16,
    pub dev_mode: bool,
    pub session: SessionConfig,
    pub identity: IdentityConfig,
    pub provider: ProviderConfig,
    pub tiers: TierTable,
    pub rate_limit: RateLimitConfig,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    /// Honour `X-Forwarded-For`/`X-Real-IP`. Only safe behind a proxy that
    /// overwrites them.
    pub trust_proxy_headers: bool,
}

impl GatewayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. All problems are
    /// collected so a misconfigured deployment reports them in one go.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems: Vec<String> = Vec::new();
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev_mode = non_empty("DEV_MODE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let database_url =
            non_empty("DATABASE_URL").unwrap_or_else(|| "sqlite://gateway.db".to_string());
        let port = parse_or(&non_empty, "PORT", 8080u16, &mut problems);

        let secret = match non_empty("SESSION_SECRET") {
            Some(s) if s.len() >= MIN_SESSION_SECRET_LEN || dev_mode => s,
            Some(_) => {
                problems.push(format!(
                    "SESSION_SECRET must be at least {} bytes",
                    MIN_SESSION_SECRET_LEN
                ));
                String::new()
            }
            None if dev_mode => "dev-mode-session-secret-not-for-production".to_string(),
            None => {
                problems.push("SESSION_SECRET is required".to_string());
                String::new()
            }
        };
        let ttl_hours = parse_or(&non_empty, "SESSION_TTL_HOURS", 24i64, &mut problems);

        let audience = non_empty("GOOGLE_CLIENT_ID").unwrap_or_else(|| {
            problems.push("GOOGLE_CLIENT_ID is required".to_string());
            String::new()
        });
        let issuers = non_empty("IDENTITY_ISSUERS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect());
        let jwks_url = non_empty("IDENTITY_JWKS_URL").unwrap_or_else(|| GOOGLE_JWKS_URL.to_string());
        let identity_timeout = parse_or(&non_empty, "IDENTITY_TIMEOUT_SECS", 5u64, &mut problems);
        let leeway_secs = parse_or(&non_empty, "IDENTITY_LEEWAY_SECS", 60u64, &mut problems);

        let kind = match non_empty("LLM_PROVIDER") {
            Some(raw) => raw.parse::<ProviderKind>().unwrap_or_else(|e| {
                problems.push(e);
                ProviderKind::Anthropic
            }),
            None => ProviderKind::Anthropic,
        };
        let base_url = non_empty("LLM_BASE_URL")
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = non_empty("LLM_API_KEY").unwrap_or_else(|| {
            problems.push("LLM_API_KEY is required".to_string());
            String::new()
        });
        let provider_timeout = parse_or(&non_empty, "LLM_TIMEOUT_SECS", 60u64, &mut problems);
        let max_prompt_chars = parse_or(&non_empty, "LLM_MAX_PROMPT_CHARS", 16_000usize, &mut problems);

        let mut tiers = TierTable::for_provider(kind);
        for tier in Tier::ALL {
            if let Some(model) = non_empty(&format!("LLM_MODEL_{}", tier.as_str().to_uppercase())) {
                tiers.override_model(tier, model);
            }
        }

        let mut rate_limit = RateLimitConfig::default();
        if let Some(enabled) = non_empty("RATE_LIMIT_ENABLED") {
            rate_limit.enabled = !enabled.eq_ignore_ascii_case("false");
        }
        rate_limit.max_requests = parse_or(
            &non_empty,
            "RATE_LIMIT_PER_WINDOW",
            rate_limit.max_requests,
            &mut problems,
        );
        let window_seconds = parse_or(
            &non_empty,
            "RATE_LIMIT_WINDOW_SECONDS",
            rate_limit.window.as_secs(),
            &mut problems,
        );
        rate_limit.window = Duration::from_secs(window_seconds);

        let cors_origins = non_empty("CORS_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });
        if cors_origins.iter().any(|origin| origin == "*") {
            problems.push(
                "CORS_ORIGINS must list explicit origins when credentials are allowed".to_string(),
            );
        }
        let max_body_bytes = parse_or(&non_empty, "MAX_BODY_BYTES", 64 * 1024usize, &mut problems);
        let trust_proxy_headers = non_empty("TRUST_PROXY_HEADERS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if !problems.is_empty() {
            bail!("invalid configuration: {}", problems.join("; "));
        }

        info!(
            provider = %kind,
            base_url = %base_url,
            issuers = ?issuers,
            dev_mode = dev_mode,
            "Configuration loaded"
        );

        Ok(Self {
            database_url,
            port,
            dev_mode,
            session: SessionConfig { secret, ttl_hours },
            identity: IdentityConfig {
                audience,
                issuers,
                jwks_url,
                timeout: Duration::from_secs(identity_timeout),
                leeway_secs,
            },
            provider: ProviderConfig {
                kind,
                base_url,
                api_key,
                timeout: Duration::from_secs(provider_timeout),
                max_prompt_chars,
            },
            tiers,
            rate_limit,
            cors_origins,
            max_body_bytes,
            trust_proxy_headers,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T, F>(get: &F, key: &str, default: T, problems: &mut Vec<String>) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            problems.push(format!("{} has an invalid value", key));
            default
        }),
        None => default,
    }
}
