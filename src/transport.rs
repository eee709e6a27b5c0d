//! The upstream transport seam. This gateway multiplexes many concurrent
//! circuits over long-lived WebSocket connections rather than a single
//! blocking socket, so the connection lifecycle is expressed as a trait
//! the collector is generic over, with the transport itself swappable for
//! a scripted stand-in under test.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("upstream closed the connection")]
    Closed,
}

/// One long-lived upstream connection. A fresh value is produced by
/// `connect` on every (re)connection attempt; the collector never reuses a
/// `Connection` across a reconnect.
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    type Connection: Send;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError>;

    /// Receives one upstream message. `Ok(None)` means the upstream closed
    /// cleanly; the collector treats that the same as a connection error
    /// and moves to backoff.
    async fn recv_frame(&self, conn: &mut Self::Connection) -> Result<Option<String>, TransportError>;

    async fn send_heartbeat(&self, conn: &mut Self::Connection) -> Result<(), TransportError>;
}

/// Production transport: a text-framed WebSocket, matching the vendor feed's
/// wire format (one frame per upstream text message).
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

pub struct WebSocketConnection {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl UpstreamTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(WebSocketConnection { stream })
    }

    async fn recv_frame(
        &self,
        conn: &mut Self::Connection,
    ) -> Result<Option<String>, TransportError> {
        match conn.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(bytes))) => Ok(Some(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Ok(_)) => Ok(Some(String::new())),
            Some(Err(e)) => Err(TransportError::Receive(e.to_string())),
        }
    }

    async fn send_heartbeat(&self, conn: &mut Self::Connection) -> Result<(), TransportError> {
        conn.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
