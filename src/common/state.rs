// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::GatewayConfig;
use crate::services::{GenerationProxy, IdentityReconciler, RateLimitService, UserStore};

/// Shared state: immutable configuration plus the long-lived services.
/// Built once in `main` and handed to handlers as `Extension<Arc<AppState>>`.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn UserStore>,
    pub reconciler: Arc<IdentityReconciler>,
    pub proxy: Arc<GenerationProxy>,
    pub rate_limiter: Arc<RateLimitService>,
}
