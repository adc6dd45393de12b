/// Errors returned by a stream transport before they are classified by the
/// session's retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response was obtained (DNS, refused connection, timeout before headers).
    #[error("connection failed: {message}")]
    Connect { message: String },
    /// The response body could not be read any further.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Connect { message } | Self::Read { message } => message,
        }
    }
}

/// Failure of a stream session before or instead of a framed result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Server answered with an error status that was not (or no longer) retried.
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    /// Every attempt failed without obtaining a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// Caller cancelled the session; `partial` holds what was accumulated.
    #[error("stream cancelled")]
    Cancelled { partial: String },
    /// Request could not be built.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl StreamError {
    /// Message surfaced to the error callback for this failure.
    pub fn callback_message(&self) -> String {
        match self {
            Self::Http { status, body } if body.trim().is_empty() => {
                format!("request failed with status {status}")
            }
            other => other.to_string(),
        }
    }
}

/// Errors surfaced by the push-notification socket client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    /// The token source had no bearer token to put in the socket URL.
    #[error("no bearer token available for socket connection")]
    MissingToken,
    /// The configured base URL cannot be turned into a socket URL.
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    /// Handshake or connection failure.
    #[error("socket connect failed: {0}")]
    Connect(String),
    /// `disconnect()` was called before the pending connect finished.
    #[error("socket disconnected before the connection was established")]
    Disconnected,
}

/// Top-level error type for the public console API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// Server response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ConsoleError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
