//! Text-frame transports
//!
//! The session actor is the only owner of a transport, so implementations
//! need no internal locking. A [`Dialer`] produces fresh transports so a
//! session can redial after the relay goes away.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{ChannelError, ChannelResult};

/// A bidirectional stream of text frames
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, text: String) -> ChannelResult<()>;

    /// Next text frame; `None` once the peer has closed
    async fn recv(&mut self) -> Option<ChannelResult<String>>;

    async fn close(&mut self);
}

/// Opens new connections to the relay
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self) -> ChannelResult<Box<dyn Transport>>;
}

// ============================================================================
// WebSocket
// ============================================================================

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> ChannelResult<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Transport(format!("connect {}: {}", url, e)))?;
        debug!(url, "WebSocket connected");
        Ok(Self { stream })
    }

    /// Connect, giving up once `limit` has passed without a completed handshake
    pub async fn connect_within(url: &str, limit: Duration) -> ChannelResult<Self> {
        tokio::time::timeout(limit, Self::connect(url))
            .await
            .map_err(|_| ChannelError::Timeout {
                method: "connect".to_string(),
            })?
    }
}

/// Dials a WebSocket URL with a handshake deadline
#[derive(Debug, Clone)]
pub struct WsDialer {
    url: String,
    limit: Duration,
}

impl WsDialer {
    pub fn new(url: impl Into<String>, limit: Duration) -> Self {
        Self { url: url.into(), limit }
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self) -> ChannelResult<Box<dyn Transport>> {
        let transport = WsTransport::connect_within(&self.url, self.limit).await?;
        Ok(Box::new(transport))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> ChannelResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(String::from_utf8(data).map_err(|e| ChannelError::Protocol(e.to_string())))
                }
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket closed by peer");
                    return None;
                }
                // Control frames are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ============================================================================
// In-process
// ============================================================================

/// One end of an in-process frame pipe
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Two connected ends
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport { tx: a_tx, rx: b_rx },
            MemoryTransport { tx: b_tx, rx: a_rx },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> ChannelResult<()> {
        self.tx.send(text).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Option<ChannelResult<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
        // Dropping the original sender ends the peer's stream.
        let (detached, _) = mpsc::unbounded_channel();
        self.tx = detached;
    }
}
