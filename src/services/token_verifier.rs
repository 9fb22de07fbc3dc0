// src/services/token_verifier.rs
//! Identity assertion verification
//!
//! Assertions are issuer-signed JWTs (Google ID tokens in production).
//! Verification is pure: no state changes besides the issuer key cache.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use reqwest::{header::CACHE_CONTROL, Client};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::common::{safe_email_log, Failure};

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// This service's registered client id; the only accepted `aud`.
    pub audience: String,
    pub issuers: Vec<String>,
    pub jwks_url: String,
    pub timeout: Duration,
    pub leeway_secs: u64,
}

/// Claims that survived verification. Request-scoped, never stored as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub email: String,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture_url: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
}

/// Source of issuer verification keys
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Algorithms this source can produce keys for
    fn algorithms(&self) -> &[Algorithm];

    /// Key for the given `kid`. Unknown keys are `UntrustedIssuer`.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, Failure>;
}

pub struct TokenVerifier {
    config: Arc<IdentityConfig>,
    keys: Arc<dyn KeySource>,
}

impl TokenVerifier {
    pub fn new(config: Arc<IdentityConfig>, keys: Arc<dyn KeySource>) -> Self {
        Self { config, keys }
    }

    pub async fn verify(&self, assertion: &str) -> Result<VerifiedClaims, Failure> {
        let assertion = assertion.trim();
        if assertion.is_empty() {
            return Err(Failure::InvalidToken);
        }

        let header = decode_header(assertion).map_err(|e| {
            debug!(error = %e, "Identity assertion header could not be decoded");
            Failure::InvalidToken
        })?;

        if !self.keys.algorithms().contains(&header.alg) {
            warn!(alg = ?header.alg, "Identity assertion uses a disallowed algorithm");
            return Err(Failure::UntrustedIssuer);
        }

        let key = tokio::time::timeout(
            self.config.timeout,
            self.keys.decoding_key(header.kid.as_deref()),
        )
        .await
        .map_err(|_| {
            warn!(timeout = ?self.config.timeout, "Timed out fetching issuer keys");
            Failure::VerificationTimeout
        })??;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_issuer(&self.config.issuers[..]);
        validation.leeway = self.config.leeway_secs;

        let data = decode::<IdTokenClaims>(assertion, &key, &validation).map_err(|e| {
            let failure = classify(e.kind());
            debug!(error = %e, code = failure.code(), "Identity assertion rejected");
            failure
        })?;
        let claims = data.claims;

        let email = claims.email.filter(|e| !e.is_empty()).ok_or_else(|| {
            warn!(subject = %claims.sub, "Identity assertion carries no email");
            Failure::InvalidToken
        })?;

        if claims.email_verified == Some(false) {
            warn!(
                subject = %claims.sub,
                email = %safe_email_log(&email),
                "Identity assertion email is not verified by the issuer"
            );
        }

        Ok(VerifiedClaims {
            subject: claims.sub,
            email,
            full_name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            picture_url: claims.picture,
            locale: claims.locale,
        })
    }
}

fn classify(kind: &ErrorKind) -> Failure {
    match kind {
        ErrorKind::ExpiredSignature => Failure::ExpiredToken,
        ErrorKind::InvalidAudience => Failure::AudienceMismatch,
        ErrorKind::InvalidSignature | ErrorKind::InvalidIssuer | ErrorKind::InvalidAlgorithm => {
            Failure::UntrustedIssuer
        }
        _ => Failure::InvalidToken,
    }
}

// ============================================================================
// JWKS key source
// ============================================================================

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedKeys {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Fetches RSA keys from an issuer's JWKS endpoint and caches them for the
/// `max-age` the issuer advertises.
pub struct JwksKeySource {
    url: String,
    http: Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksKeySource {
    pub fn new(url: impl Into<String>, http: Client) -> Self {
        Self {
            url: url.into(),
            http,
            cache: RwLock::new(None),
        }
    }

    async fn cached(&self, kid: &str) -> Option<DecodingKey> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.is_fresh())
            .and_then(|c| c.keys.get(kid).cloned())
    }

    async fn refresh(&self) -> Result<(), Failure> {
        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock, and
        // unknown kids must not turn into one fetch per request.
        if let Some(current) = cache.as_ref() {
            if current.is_fresh() && current.fetched_at.elapsed() < MIN_REFRESH_INTERVAL {
                return Ok(());
            }
        }

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Failure::IssuerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Failure::IssuerUnavailable(format!(
                "JWKS endpoint returned HTTP {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| Failure::IssuerUnavailable(format!("invalid JWKS document: {}", e)))?;

        let keys = decoding_keys(set);
        info!(url = %self.url, key_count = keys.len(), ttl_secs = ttl.as_secs(), "Issuer keys refreshed");

        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
            ttl,
        });
        Ok(())
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    fn algorithms(&self) -> &[Algorithm] {
        &[Algorithm::RS256]
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, Failure> {
        let kid = kid.ok_or(Failure::UntrustedIssuer)?;
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        self.refresh().await?;

        self.cached(kid).await.ok_or_else(|| {
            warn!(kid = %kid, "Identity assertion signed with an unknown key");
            Failure::UntrustedIssuer
        })
    }
}

fn decoding_keys(set: JwkSet) -> HashMap<String, DecodingKey> {
    set.keys
        .into_iter()
        .filter(|jwk| jwk.kty == "RSA")
        .filter_map(|jwk| {
            let kid = jwk.kid?;
            let key = DecodingKey::from_rsa_components(jwk.n.as_deref()?, jwk.e.as_deref()?)
                .map_err(|e| warn!(kid = %kid, error = %e, "Skipping malformed JWK"))
                .ok()?;
            Some((kid, key))
        })
        .collect()
}

fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
