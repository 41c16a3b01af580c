//! Transport abstraction traits for tradesync.
//!
//! A [`Connector`] opens one receive-only [`Connection`] to an endpoint. The
//! session drives the connection and never sends application data on it.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Counter to keep ids unique within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
///
/// Every transport error is terminal for the connection that raised it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The page origin cannot be turned into a stream endpoint.
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Connection was refused or the handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete in time.
    #[error("Handshake timed out after {0} ms")]
    Timeout(u64),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Opens connections to a streaming endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `endpoint`.
    ///
    /// Resolves once the handshake completes or fails.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// An open, receive-only connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next application frame.
    ///
    /// Returns `None` if the connection was closed cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
