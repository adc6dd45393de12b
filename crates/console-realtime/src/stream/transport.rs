use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::header::HeaderMap;

use crate::errors::{ConsoleError, TransportError};

/// Body bytes of an accepted response, delivered at arbitrary boundaries.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// One streaming POST, kept intact so retries resend the same body.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub body: bytes::Bytes,
    pub headers: HeaderMap,
}

/// Response head plus the live body.
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport contract used by `StreamSession`.
///
/// `send` resolves once response headers are available; it fails only when no
/// response was obtained at all.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    async fn send(&self, request: &StreamRequest) -> Result<StreamResponse, TransportError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    header_timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport whose request phase (connect, TLS, response
    /// headers) is bounded by `request_timeout`.
    ///
    /// The body itself has no deadline: streams stay open as long as the
    /// server keeps them open.
    pub fn new(request_timeout: Duration) -> Result<Self, ConsoleError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| ConsoleError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, request_timeout))
    }

    pub fn with_client(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            header_timeout: request_timeout,
        }
    }
}

#[async_trait::async_trait]
impl StreamTransport for HttpTransport {
    async fn send(&self, request: &StreamRequest) -> Result<StreamResponse, TransportError> {
        let pending = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send();
        // reqwest's own timeout would also cut the live body, so only the
        // wait for headers is bounded here
        let response = tokio::time::timeout(self.header_timeout, pending)
            .await
            .map_err(|_| {
                TransportError::connect(format!(
                    "no response from {} within {:?}",
                    request.url, self.header_timeout
                ))
            })?
            .map_err(|e| TransportError::connect(format!("request to {} failed: {e}", request.url)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(StreamResponse {
            status,
            body: Box::pin(body),
        })
    }
}
