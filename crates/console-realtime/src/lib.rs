//! Resilient real-time client layer for the transcription console.
//!
//! Two independent clients share one [`ConsoleConfig`]:
//!
//! - [`AssistantClient`] streams assistant replies over an event stream,
//!   retrying the initial connection with exponential backoff.
//! - [`SocketClient`] keeps a push-notification socket open, reconnecting on
//!   abnormal closes until the reconnect budget is spent.
//!
//! ```no_run
//! use console_realtime::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ConsoleError> {
//! let config = ConsoleConfig::from_env()?;
//! let assistant = AssistantClient::new(config.clone())?;
//!
//! let session = assistant
//!     .session()
//!     .on_chunk(|text| print!("{text}"))
//!     .on_error(|message| eprintln!("assistant failed: {message}"));
//! let outcome = assistant
//!     .chat_stream(ChatRequest::new().user_text("Summarize the last meeting"), session)
//!     .await?;
//! println!("\n({} chars)", outcome.text.len());
//!
//! let socket = SocketClient::new(&config);
//! socket.on_status_change(|job_id, status, progress| {
//!     println!("job {job_id}: {status} ({progress:.0}%)");
//! });
//! socket.connect().await?;
//! # Ok(())
//! # }
//! ```

/// Chat request types and the assistant client.
pub mod assistant;
/// Exponential backoff shared by stream retries and socket reconnects.
pub mod backoff;
/// Client configuration and bearer token sources.
pub mod config;
/// Public error types.
pub mod errors;
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
pub mod socket;
pub mod stream;

pub use assistant::{AssistantClient, ChatMessage, ChatRequest, ChatRole};
pub use backoff::{Backoff, RetryState};
pub use config::{ConsoleConfig, StaticToken, TokenSource};
pub use errors::{ConsoleError, SocketError, StreamError, TransportError};
pub use observability::init_observability;
pub use socket::{ConnectionState, JobStatus, PushKind, PushMessage, SocketClient};
pub use stream::{
    AbortHandle, StreamCallbacks, StreamClient, StreamEnding, StreamOutcome, StreamSession,
};
