//! # tradesync-transport
//!
//! Receive-only streaming transport for the tradesync sync client.
//!
//! - **Endpoint** - Derives the stream endpoint from the page origin
//! - **State** - The connection lifecycle state machine
//! - **WebSocket** - Client transport over tokio-tungstenite
//!
//! ## Transport Abstraction
//!
//! Transports implement the `Connector` and `Connection` traits, so the
//! session loop does not care what carries the frames.
//!
//! ```rust,ignore
//! use tradesync_transport::{Connection, Connector, WebSocketConnector};
//!
//! async fn pump(connector: WebSocketConnector) {
//!     let mut conn = connector.connect("ws://localhost:8080/ws").await?;
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Route frame
//!     }
//! }
//! ```

pub mod endpoint;
pub mod state;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::{endpoint_from_origin, DEFAULT_STREAM_PATH};
pub use state::{ConnectionState, StateTracker, Transition};
pub use traits::{Connection, ConnectionId, Connector, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
