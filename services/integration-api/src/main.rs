//! iFood merchant integration service
//!
//! Single-binary service that:
//! 1. Runs the distributed (device-code) authorization flow per merchant
//! 2. Keeps access tokens valid with lazy, per-merchant-serialized renewal
//! 3. Proxies authenticated order/menu reads to the merchant API
//! 4. Acknowledges merchant webhooks fast and processes them in background

mod config;
mod error;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ifood_auth::IntegrationStore;
use ifood_guard::{EventDispatcher, MerchantApi, TokenGuard, event_channel, spawn_event_worker};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting ifood-integration-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        auth_base_url = %config.vendor.auth_base_url,
        api_base_url = %config.vendor.api_base_url,
        store_path = %config.store.path.display(),
        safety_margin_secs = config.guard.safety_margin_secs,
        "configuration loaded"
    );

    // One HTTP client for every vendor call, created once and injected.
    // The timeout bounds token renewals and API passthrough alike.
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store = Arc::new(
        IntegrationStore::load(config.store.path.clone())
            .await
            .map_err(|e| anyhow::anyhow!("failed to load integration store: {e}"))?,
    );

    let guard = Arc::new(TokenGuard::new(
        store.clone(),
        config.vendor_config(),
        http_client.clone(),
        config.safety_margin(),
    ));
    let api = Arc::new(MerchantApi::new(guard.clone(), http_client));

    // Webhook events drain on a detached worker; its failures are logged,
    // never surfaced to the (already answered) webhook response.
    let (event_tx, event_rx) = event_channel();
    let _worker = spawn_event_worker(event_rx, api.clone());
    let dispatcher = Arc::new(EventDispatcher::new(store, event_tx));

    let app_state = AppState {
        guard,
        api,
        dispatcher,
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow client cannot block exit
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
