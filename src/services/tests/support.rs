// src/services/tests/support.rs
//! Stubs and fixtures shared by the service tests

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{AppState, Failure, GatewayConfig};
use crate::services::identity::IdentityReconciler;
use crate::services::llm_proxy::GenerationProxy;
use crate::services::rate_limit::RateLimitService;
use crate::services::provider_transport::{ProviderReply, ProviderTransport, TransportError};
use crate::services::token_verifier::{IdentityConfig, KeySource, TokenVerifier};
use crate::services::user_store::{ProfileUpsert, SqliteUserStore, UserProfile, UserStore};

pub const TEST_AUDIENCE: &str = "client-123.apps.googleusercontent.com";
pub const TEST_ISSUER: &str = "https://accounts.google.com";
pub const TEST_SECRET: &[u8] = b"identity-test-signing-secret";
pub const TEST_SESSION_SECRET: &str = "session-secret-for-tests-0123456789abcdef";

pub fn identity_config() -> Arc<IdentityConfig> {
    Arc::new(IdentityConfig {
        audience: TEST_AUDIENCE.to_string(),
        issuers: vec![
            "accounts.google.com".to_string(),
            TEST_ISSUER.to_string(),
        ],
        jwks_url: "http://127.0.0.1:9/certs".to_string(),
        timeout: Duration::from_millis(300),
        leeway_secs: 0,
    })
}

// ============================================================================
// Key source
// ============================================================================

pub struct StaticKeySource {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StaticKeySource {
    pub fn hs256() -> Self {
        Self {
            key: DecodingKey::from_secret(TEST_SECRET),
            algorithms: vec![Algorithm::HS256],
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::hs256()
        }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.key.clone())
    }
}

pub fn verifier_with(keys: Arc<dyn KeySource>) -> Arc<TokenVerifier> {
    Arc::new(TokenVerifier::new(identity_config(), keys))
}

// ============================================================================
// Assertions
// ============================================================================

/// Google-shaped ID token claims expiring `expires_in_secs` from now
pub fn claims_for(subject: &str, expires_in_secs: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "sub": subject,
        "email": format!("{}@example.com", subject),
        "email_verified": true,
        "name": "Ada Lovelace",
        "given_name": "Ada",
        "family_name": "Lovelace",
        "picture": "https://img.example.com/ada.png",
        "locale": "en",
        "iat": now,
        "exp": now + expires_in_secs,
    })
}

pub fn sign_hs256(claims: &Value) -> String {
    sign_hs256_with(claims, TEST_SECRET)
}

pub fn sign_hs256_with(claims: &Value, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test-key".to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

// ============================================================================
// User store
// ============================================================================

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::common::migrations::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn count_users(pool: &SqlitePool, subject: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE subject = ?")
        .bind(subject)
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

/// SQLite store that counts upserts and can be told to fail the next N.
pub struct CountingStore {
    inner: SqliteUserStore,
    pub upserts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl CountingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::failing(pool, 0)
    }

    pub fn failing(pool: SqlitePool, failures: usize) -> Self {
        Self {
            inner: SqliteUserStore::new(pool),
            upserts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<UserProfile>, Failure> {
        self.inner.find_by_subject(subject).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfile>, Failure> {
        self.inner.find_by_id(id).await
    }

    async fn upsert(&self, profile: &ProfileUpsert) -> Result<UserProfile, Failure> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Failure::PersistenceFailure("database is locked".to_string()));
        }
        self.inner.upsert(profile).await
    }
}

// ============================================================================
// Provider transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that replays canned replies and records what it was sent
pub struct StubTransport {
    replies: Mutex<VecDeque<Result<ProviderReply, TransportError>>>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn replying(status: u16, body: &str) -> Self {
        Self::with(Ok(reply(status, None, body)))
    }

    pub fn with(result: Result<ProviderReply, TransportError>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(vec![result])),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

pub fn reply(status: u16, retry_after: Option<u64>, body: &str) -> ProviderReply {
    ProviderReply {
        status,
        retry_after,
        body: bytes::Bytes::from(body.to_string()),
    }
}

#[async_trait]
impl ProviderTransport for StubTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> Result<ProviderReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.to_vec(),
            body: body.clone(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no canned reply".to_string())))
    }
}

// ============================================================================
// Application state
// ============================================================================

pub fn test_config(overrides: &[(&str, &str)]) -> GatewayConfig {
    let mut env: HashMap<String, String> = [
        ("SESSION_SECRET", TEST_SESSION_SECRET),
        ("GOOGLE_CLIENT_ID", TEST_AUDIENCE),
        ("LLM_PROVIDER", "anthropic"),
        ("LLM_BASE_URL", "https://llm.example.com"),
        ("LLM_API_KEY", "sk-test-key"),
        ("LLM_MAX_PROMPT_CHARS", "200"),
        ("MAX_BODY_BYTES", "4096"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }
    GatewayConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Full application state over an in-memory database, HS256 test assertions
/// and the given provider transport.
pub async fn test_app_state(transport: Arc<StubTransport>) -> (Arc<AppState>, SqlitePool) {
    test_app_state_with(transport, &[]).await
}

pub async fn test_app_state_with(
    transport: Arc<StubTransport>,
    overrides: &[(&str, &str)],
) -> (Arc<AppState>, SqlitePool) {
    let config = Arc::new(test_config(overrides));
    let pool = memory_pool().await;
    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));

    let reconciler = Arc::new(IdentityReconciler::new(
        verifier_with(Arc::new(StaticKeySource::hs256())),
        store.clone(),
    ));
    let proxy = Arc::new(GenerationProxy::new(
        Arc::new(config.provider.clone()),
        Arc::new(config.tiers.clone()),
        transport,
    ));
    let rate_limiter = Arc::new(RateLimitService::new(config.rate_limit.clone()));

    let state = Arc::new(AppState {
        db: pool.clone(),
        config,
        store,
        reconciler,
        proxy,
        rate_limiter,
    });
    (state, pool)
}
