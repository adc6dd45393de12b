//! Common imports for typical console client usage.
pub use crate::{
    AbortHandle, AssistantClient, Backoff, ChatMessage, ChatRequest, ChatRole, ConnectionState,
    ConsoleConfig, ConsoleError, JobStatus, PushKind, PushMessage, SocketClient, SocketError,
    StreamEnding, StreamError, StreamOutcome, StreamSession,
};
