//! Incremental event-stream reader with connection-level retry.
//!
//! Bytes flow `StreamTransport` → [`Framer`] → [`FrameDispatcher`] → caller
//! callbacks. Only the initial connection is retried; once a response is
//! accepted a dropped connection is treated as the end of the stream.
mod dispatch;
mod framer;
mod payload;
mod session;
mod transport;

pub use dispatch::{FrameDispatcher, SessionState, StreamCallbacks, StreamEnding, StreamOutcome};
pub use framer::{EventFrame, Framer};
pub use payload::{PayloadAction, StreamPayload};
pub use session::{
    AbortHandle, RETRYABLE_STATUSES, StreamClient, StreamSession, is_retryable_status,
};
pub use transport::{ByteStream, HttpTransport, StreamRequest, StreamResponse, StreamTransport};
