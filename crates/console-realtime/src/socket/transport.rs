use std::time::Duration;

use futures::StreamExt as _;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::errors::SocketError;

/// Close code for an intentional, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when the connection ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// What the socket produced next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Closed { code: u16 },
}

/// One established connection.
#[async_trait::async_trait]
pub trait SocketConnection: Send {
    /// Waits for the next text frame or the end of the connection. After
    /// `Closed` the connection is finished.
    async fn next_event(&mut self) -> SocketEvent;

    async fn close(&mut self, code: u16, reason: &str);
}

/// Opens connections for `SocketClient`; one call per connection attempt.
#[async_trait::async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketConnection>, SocketError>;
}

/// `tokio-tungstenite` connector.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl WsConnector {
    /// `handshake_timeout` bounds TCP, TLS and the upgrade together; expiry
    /// counts as a failed attempt.
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait::async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketConnection>, SocketError> {
        let (stream, _response) = tokio::time::timeout(self.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| {
                SocketError::Connect(format!(
                    "handshake timed out after {:?}",
                    self.handshake_timeout
                ))
            })?
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl SocketConnection for WsConnection {
    async fn next_event(&mut self) -> SocketEvent {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return SocketEvent::Text(text.as_str().to_owned()),
                Ok(Message::Close(frame)) => {
                    let code = frame.map_or(ABNORMAL_CLOSURE, |f| u16::from(f.code));
                    return SocketEvent::Closed { code };
                }
                // pings are answered by tungstenite on the next read
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "socket read failed");
                    return SocketEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                    };
                }
            }
        }
        SocketEvent::Closed {
            code: ABNORMAL_CLOSURE,
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!(error = %e, "socket close handshake failed");
        }
        // wait briefly for the peer to acknowledge
        let drain = async { while let Some(Ok(_)) = self.stream.next().await {} };
        let _ = tokio::time::timeout(CLOSE_ACK_TIMEOUT, drain).await;
    }
}
