//! # tradesync
//!
//! Keeps cached dashboard data fresh from the server's event stream and runs
//! the live-tracking jitter simulation alongside it.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tradesync
//!
//! # Run with a specific config file
//! TRADESYNC_CONFIG=/path/to/tradesync.toml tradesync
//!
//! # Point at another origin
//! TRADESYNC_ORIGIN=https://app.example.com tradesync
//! ```

mod config;
mod metrics;
mod session;
mod status;

use anyhow::{Context, Result};
use session::SyncSession;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tradesync_core::{QueryCache, StaticMarkers};
use tradesync_transport::WebSocketConnector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradesync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;
    config.validate().context("Invalid configuration")?;
    let session_config = config.session_config()?;

    info!("Starting tradesync for {}", config.origin);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let cache = Arc::new(QueryCache::new());
    let connector = Arc::new(WebSocketConnector::new(config.websocket_config()));
    let markers = Arc::new(StaticMarkers(config.markers.ids.clone()));

    let session = SyncSession::start(session_config, connector, cache.clone(), markers);

    let (stop_status, status_stopped) = oneshot::channel::<()>();
    let status_task = if config.status.enabled {
        let state = status::StatusState {
            session: session.view(),
            cache,
        };
        let addr = config.status_addr();
        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = status_stopped.await;
            };
            if let Err(e) = status::run_status_server(&addr, state, shutdown).await {
                error!("Status server failed: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    let stats = session.router_stats();
    info!(
        frames = stats.frames,
        invalidations = stats.invalidations,
        malformed = stats.malformed,
        "Shutting down"
    );

    session.shutdown().await;

    let _ = stop_status.send(());
    if let Some(task) = status_task {
        let _ = task.await;
    }

    Ok(())
}
