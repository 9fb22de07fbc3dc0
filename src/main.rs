// src/main.rs
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod app;
mod auth;
mod common;
mod generation;
mod rate_limit_middleware;
mod services;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use common::{AppState, GatewayConfig};
use services::provider_transport::HttpTransport;
use services::token_verifier::JwksKeySource;
use services::{GenerationProxy, IdentityReconciler, RateLimitService, SqliteUserStore, TokenVerifier};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = Arc::new(GatewayConfig::from_env()?);
    if config.dev_mode {
        info!("DEV MODE enabled: session secret length check relaxed");
    }

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = config.database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    // Run database migrations
    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let identity_http = reqwest::Client::builder()
        .timeout(config.identity.timeout)
        .build()?;
    let key_source = Arc::new(JwksKeySource::new(
        config.identity.jwks_url.clone(),
        identity_http,
    ));
    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(config.identity.clone()),
        key_source,
    ));
    info!(audience = %config.identity.audience, "TokenVerifier initialized");

    let store = Arc::new(SqliteUserStore::new(pool.clone()));
    let reconciler = Arc::new(IdentityReconciler::new(verifier, store.clone()));
    info!("IdentityReconciler initialized");

    let transport = Arc::new(HttpTransport::new(config.provider.timeout)?);
    let proxy = Arc::new(GenerationProxy::new(
        Arc::new(config.provider.clone()),
        Arc::new(config.tiers.clone()),
        transport,
    ));
    info!(provider = %config.provider.kind, "GenerationProxy initialized");

    let rate_limiter = Arc::new(RateLimitService::new(config.rate_limit.clone()));
    spawn_rate_limit_cleanup(rate_limiter.clone());

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        store,
        reconciler,
        proxy,
        rate_limiter,
    });

    let app = app::build_router(state);

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

fn spawn_rate_limit_cleanup(rate_limiter: Arc<RateLimitService>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            rate_limiter.cleanup_expired().await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
