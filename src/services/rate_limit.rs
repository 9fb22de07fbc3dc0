// src/services/rate_limit.rs
//! In-process sliding-window rate limiter for inbound requests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited { retry_after: u64 },
}

#[derive(Debug, Clone)]
pub struct RateLimitService {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            enabled = config.enabled,
            max_requests = config.max_requests,
            window_seconds = config.window.as_secs(),
            "Initializing RateLimitService"
        );
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed;
        }

        let mut windows = self.windows.lock().await;
        let hits = windows.entry(key.to_string()).or_default();

        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.config.max_requests as usize {
            let retry_after = hits
                .front()
                .map(|oldest| {
                    self.config
                        .window
                        .saturating_sub(now.saturating_duration_since(*oldest))
                })
                .unwrap_or(self.config.window);
            debug!(key = %key, hits = hits.len(), "Rate limit reached");
            // Round up so clients never retry a moment too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            return RateLimitResult::Limited {
                retry_after: secs.max(1),
            };
        }

        hits.push_back(now);
        RateLimitResult::Allowed
    }

    /// Drop keys with no hits inside the window. Called periodically.
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let window = self.config.window;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, hits| {
            hits.back()
                .map(|latest| now.saturating_duration_since(*latest) < window)
                .unwrap_or(false)
        });
        debug!(removed = before - windows.len(), "Cleaned up rate limit windows");
    }
}
