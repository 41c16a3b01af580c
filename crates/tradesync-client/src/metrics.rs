//! Metrics collection and export for tradesync.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tradesync_core::FrameOutcome;
use tradesync_transport::{ConnectionState, TransportError};

/// Metric names.
pub mod names {
    pub const FRAMES_TOTAL: &str = "tradesync_frames_total";
    pub const DECODE_ERRORS_TOTAL: &str = "tradesync_decode_errors_total";
    pub const UNKNOWN_EVENTS_TOTAL: &str = "tradesync_unknown_events_total";
    pub const INVALIDATIONS_TOTAL: &str = "tradesync_invalidations_total";
    pub const JITTER_TICKS_TOTAL: &str = "tradesync_jitter_ticks_total";
    pub const TRANSPORT_ERRORS_TOTAL: &str = "tradesync_transport_errors_total";
    pub const CONNECTIONS_ACTIVE: &str = "tradesync_connections_active";
    pub const CONNECTION_STATE: &str = "tradesync_connection_state";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of inbound frames");
    metrics::describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Frames dropped because they could not be decoded"
    );
    metrics::describe_counter!(
        names::UNKNOWN_EVENTS_TOTAL,
        "Decoded events with no routing entry"
    );
    metrics::describe_counter!(
        names::INVALIDATIONS_TOTAL,
        "Cache invalidations issued, by target"
    );
    metrics::describe_counter!(names::JITTER_TICKS_TOTAL, "Jitter simulator ticks");
    metrics::describe_counter!(names::TRANSPORT_ERRORS_TOTAL, "Terminal transport errors");
    metrics::describe_gauge!(names::CONNECTIONS_ACTIVE, "Currently open stream connections");
    metrics::describe_gauge!(
        names::CONNECTION_STATE,
        "Connection state (0 connecting, 1 open, 2 closing, 3 closed, 4 errored)"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record the outcome of one inbound frame.
pub fn record_outcome(outcome: &FrameOutcome) {
    counter!(names::FRAMES_TOTAL).increment(1);

    match outcome {
        FrameOutcome::Routed { targets, .. } => {
            for target in targets.iter() {
                counter!(names::INVALIDATIONS_TOTAL, "target" => target.resource_key())
                    .increment(1);
            }
        }
        FrameOutcome::Unknown(_) => counter!(names::UNKNOWN_EVENTS_TOTAL).increment(1),
        FrameOutcome::Malformed(_) => counter!(names::DECODE_ERRORS_TOTAL).increment(1),
    }
}

/// Record a jitter tick.
pub fn record_jitter_tick() {
    counter!(names::JITTER_TICKS_TOTAL).increment(1);
}

/// Record a terminal transport error.
pub fn record_transport_error(error: &TransportError) {
    counter!(names::TRANSPORT_ERRORS_TOTAL, "kind" => error_kind(error)).increment(1);
}

/// Publish the connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!(names::CONNECTION_STATE).set(state_value(state));
}

fn error_kind(error: &TransportError) -> &'static str {
    match error {
        TransportError::InvalidOrigin(_) => "invalid_origin",
        TransportError::Handshake(_) => "handshake",
        TransportError::Timeout(_) => "timeout",
        TransportError::ReceiveFailed(_) => "receive",
        TransportError::Other(_) => "other",
    }
}

fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Connecting => 0.0,
        ConnectionState::Open => 1.0,
        ConnectionState::Closing => 2.0,
        ConnectionState::Closed => 3.0,
        ConnectionState::Errored => 4.0,
    }
}

/// Metrics guard that counts an open connection until dropped.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
