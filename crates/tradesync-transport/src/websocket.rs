//! WebSocket client transport.
//!
//! This module provides a receive-only WebSocket client using tokio-tungstenite.
//! Secure (`wss`) endpoints need the `tls` feature.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

use crate::traits::{Connection, ConnectionId, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client configuration.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConfig {
    /// Upper bound on the opening handshake. `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
}

/// Opens WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a connector.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!(endpoint = %endpoint, "Opening WebSocket");

        let handshake = connect_async(endpoint);
        let result = match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| TransportError::Timeout(limit.as_millis() as u64))?,
            None => handshake.await,
        };

        let (stream, response) = result.map_err(|e| {
            warn!(endpoint = %endpoint, error = %e, "WebSocket handshake failed");
            TransportError::Handshake(e.to_string())
        })?;

        let conn = WebSocketConnection::new(stream);
        info!(
            connection = %conn.id(),
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket connected"
        );

        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: Mutex<WsStream>,
    is_open: AtomicBool,
}

impl WebSocketConnection {
    fn new(stream: WsStream) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream: Mutex::new(stream),
            is_open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::from(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    // Decoded the same way as text
                    return Ok(Some(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // tungstenite queues the pong reply itself
                    trace!(connection = %self.id, "Keepalive");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, ?frame, "Received close frame");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut stream = self.stream.lock().await;
        match stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Other(format!("Failed to close: {}", e))),
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn serve_frames(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(frame).await.unwrap();
            }
            let _ = ws.close(None).await;
            // Drain until the client acknowledges the close.
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{}/ws", addr)
    }

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert!(config.handshake_timeout.is_none());
        assert_eq!(WebSocketConnector::default().name(), "websocket");
    }

    #[tokio::test]
    async fn test_receives_text_and_binary_frames() {
        let endpoint = serve_frames(vec![
            Message::Text(r#"{"type":"job_update","payload":{}}"#.to_string()),
            Message::Binary(br#"{"type":"vehicle_update","payload":{}}"#.to_vec()),
        ])
        .await;

        let connector = WebSocketConnector::default();
        let mut conn = connector.connect(&endpoint).await.unwrap();
        assert!(conn.is_open());

        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], br#"{"type":"job_update","payload":{}}"#);
        let second = conn.recv().await.unwrap().unwrap();
        assert_eq!(&second[..], br#"{"type":"vehicle_update","payload":{}}"#);

        assert!(conn.recv().await.unwrap().is_none());
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_refused_connection_is_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::default();
        let result = connector.connect(&format!("ws://{}/ws", addr)).await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept TCP but never answer the upgrade request.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let connector = WebSocketConnector::new(WebSocketConfig {
            handshake_timeout: Some(Duration::from_millis(100)),
        });
        let result = connector.connect(&format!("ws://{}/ws", addr)).await;
        assert!(matches!(result, Err(TransportError::Timeout(100))));

        server.abort();
    }

    #[tokio::test]
    async fn test_local_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = WebSocketConnector::default();
        let mut conn = connector.connect(&format!("ws://{}/ws", addr)).await.unwrap();

        conn.close().await.unwrap();
        assert!(!conn.is_open());
        // Closing twice is fine.
        conn.close().await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());
    }
}
