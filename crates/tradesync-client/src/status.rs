//! HTTP status surface.
//!
//! Exposes the connected flag, cache staleness and marker positions for
//! view layers that are not in-process.

use crate::session::SessionView;
use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tradesync_core::{MarkerId, Position, QueryCache, RouterStats};
use tradesync_transport::ConnectionState;

/// Shared handler state.
#[derive(Clone)]
pub struct StatusState {
    /// The running session.
    pub session: SessionView,
    /// The cache the session invalidates.
    pub cache: Arc<QueryCache>,
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub state: ConnectionState,
    pub stale: Vec<String>,
    pub markers: BTreeMap<MarkerId, Position>,
    pub router: RouterStats,
}

/// Build the status router.
pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Serve the status surface until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_status_server(
    addr: &str,
    state: StatusState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Status server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn status_handler(State(state): State<StatusState>) -> Json<StatusResponse> {
    let session = &state.session;
    Json(StatusResponse {
        connected: session.is_connected(),
        state: session.state(),
        stale: state.cache.stale_keys(),
        markers: session.markers(),
        router: session.router_stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, SyncSession};
    use async_trait::async_trait;
    use std::time::Duration;
    use tradesync_core::{CacheInvalidator, JitterConfig, StaticMarkers};
    use tradesync_protocol::FrameDecoder;
    use tradesync_transport::{Connection, Connector, TransportError};

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
            Err(TransportError::Handshake("unreachable".to_string()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_session() {
        let cache = Arc::new(QueryCache::new());
        let session = SyncSession::start(
            SessionConfig {
                endpoint: "ws://127.0.0.1:1/ws".to_string(),
                decoder: FrameDecoder::default(),
                jitter: JitterConfig::default(),
                rng_seed: Some(1),
            },
            Arc::new(Unreachable),
            cache.clone(),
            Arc::new(StaticMarkers(vec!["truck-1".to_string()])),
        );
        cache.invalidate("/api/vehicles");

        tokio::time::sleep(Duration::from_secs(6)).await;

        let state = StatusState {
            session: session.view(),
            cache: cache.clone(),
        };
        let Json(status) = status_handler(State(state)).await;

        assert!(!status.connected);
        assert_eq!(status.state, ConnectionState::Errored);
        assert_eq!(status.stale, vec!["/api/vehicles"]);
        assert!(status.markers.contains_key("truck-1"));

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["state"], "errored");
        assert_eq!(body["router"]["frames"], 0);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_health() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
