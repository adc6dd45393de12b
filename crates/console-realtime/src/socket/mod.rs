//! Reconnecting push-notification socket.
//!
//! A [`SocketClient`] owns at most one live connection. Inbound text frames
//! are decoded into [`PushMessage`]s and fanned out to the registered
//! handlers; abnormal closes are retried with exponential backoff.
mod client;
mod handlers;
mod message;
mod transport;

pub use client::{ConnectionState, SocketClient, socket_url};
pub use message::{ERROR_TYPE, JobStatus, PushKind, PushMessage};
pub use transport::{
    ABNORMAL_CLOSURE, NORMAL_CLOSURE, SocketConnection, SocketConnector, SocketEvent, WsConnector,
};
