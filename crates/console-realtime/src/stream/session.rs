use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::header::HeaderMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, RetryState};
use crate::errors::StreamError;

use super::dispatch::{FrameDispatcher, StreamCallbacks, StreamOutcome};
use super::framer::Framer;
use super::transport::{ByteStream, StreamRequest, StreamResponse, StreamTransport};

/// Statuses that are retried while the connection is being established.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

// Upper bound on how much of an error response body is kept for messages.
const ERROR_BODY_LIMIT: usize = 4 * 1024;
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Handle used to cancel a stream session from outside.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. The session stops at its next await point,
    /// releases the response body and fires no further callbacks.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Factory for stream sessions sharing one transport and retry policy.
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn StreamTransport>,
    backoff: Backoff,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn StreamTransport>, backoff: Backoff) -> Self {
        Self { transport, backoff }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Starts a new logical request with fresh retry state.
    pub fn session(&self) -> StreamSession {
        StreamSession::new(self.transport.clone(), self.backoff.clone())
    }
}

/// One logical streaming request.
///
/// Owns its framer, retry counter and callbacks for its whole lifetime.
pub struct StreamSession {
    session_id: uuid::Uuid,
    transport: Arc<dyn StreamTransport>,
    backoff: Backoff,
    callbacks: StreamCallbacks,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
}

impl StreamSession {
    fn new(transport: Arc<dyn StreamTransport>, backoff: Backoff) -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            session_id: uuid::Uuid::new_v4(),
            transport,
            backoff,
            callbacks: StreamCallbacks::default(),
            abort_tx,
            abort_rx,
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    pub fn callbacks(mut self, callbacks: StreamCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_chunk(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.callbacks = self.callbacks.on_chunk(f);
        self
    }

    pub fn on_complete(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.callbacks = self.callbacks.on_complete(f);
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.callbacks = self.callbacks.on_error(f);
        self
    }

    /// POSTs `body` as JSON to `url` and consumes the event stream.
    ///
    /// Resolves with the accumulated text once the stream ends. Errors are
    /// returned only when no stream was ever accepted or the caller aborted.
    pub async fn open<B>(
        self,
        url: impl Into<String>,
        body: &B,
        headers: HeaderMap,
    ) -> Result<StreamOutcome, StreamError>
    where
        B: serde::Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body)
            .map_err(|e| StreamError::Validation(format!("failed to encode request body: {e}")))?;
        let request = StreamRequest {
            url: url.into(),
            body: body.into(),
            headers,
        };
        self.run(request).await
    }

    /// Same as [`open`](Self::open) for an already encoded request.
    pub async fn run(self, request: StreamRequest) -> Result<StreamOutcome, StreamError> {
        let Self {
            session_id,
            transport,
            backoff,
            callbacks,
            abort_tx: _abort_tx,
            mut abort_rx,
        } = self;
        let mut dispatcher = FrameDispatcher::new(session_id, callbacks);

        let response =
            match establish(session_id, transport.as_ref(), &backoff, &request, &mut abort_rx)
                .await
            {
                Ok(response) => response,
                Err(StreamError::Cancelled { .. }) => {
                    debug!(session_id = %session_id, "stream cancelled before response");
                    return Err(StreamError::Cancelled {
                        partial: String::new(),
                    });
                }
                Err(err) => {
                    dispatcher.fail(err.callback_message());
                    return Err(err);
                }
            };

        info!(session_id = %session_id, status = response.status, "stream accepted");
        let mut framer = Framer::new();
        let mut body = response.body;
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = wait_for_abort(&mut abort_rx) => break true,
                next = body.next() => match next {
                    Some(Ok(chunk)) => {
                        dispatcher.dispatch(framer.feed(&chunk));
                        if !dispatcher.is_active() {
                            break false;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(session_id = %session_id, error = %err, "stream dropped mid-read; treating as end of stream");
                        break false;
                    }
                    None => break false,
                },
            }
        };
        drop(body);

        if cancelled {
            debug!(session_id = %session_id, "stream cancelled mid-read");
            return Err(StreamError::Cancelled {
                partial: dispatcher.cancel(),
            });
        }
        dispatcher.dispatch_trailing(framer.flush());
        let outcome = dispatcher.finish();
        debug!(session_id = %session_id, ending = ?outcome.ending, chars = outcome.text.len(), "stream finished");
        Ok(outcome)
    }
}

/// Connection-level retry: resolves with the first accepted response.
async fn establish(
    session_id: uuid::Uuid,
    transport: &dyn StreamTransport,
    backoff: &Backoff,
    request: &StreamRequest,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<StreamResponse, StreamError> {
    let mut retry = RetryState::new(backoff.max_retries);
    loop {
        let attempt = tokio::select! {
            biased;
            _ = wait_for_abort(abort_rx) => {
                return Err(StreamError::Cancelled { partial: String::new() });
            }
            attempt = transport.send(request) => attempt,
        };

        let failure = match attempt {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status;
                let body = tokio::select! {
                    biased;
                    _ = wait_for_abort(abort_rx) => {
                        return Err(StreamError::Cancelled { partial: String::new() });
                    }
                    body = read_error_body(response.body) => body,
                };
                let err = StreamError::Http { status, body };
                if !is_retryable_status(status) {
                    warn!(session_id = %session_id, status, "stream request rejected");
                    return Err(err);
                }
                err
            }
            Err(err) => StreamError::Transport(err.message().to_string()),
        };

        if retry.exhausted() {
            warn!(session_id = %session_id, attempts = retry.attempt + 1, error = %failure, "stream retries exhausted");
            return Err(failure);
        }
        let delay = retry.next_delay(backoff);
        info!(
            session_id = %session_id,
            attempt = retry.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "retrying stream request"
        );
        tokio::select! {
            biased;
            _ = wait_for_abort(abort_rx) => {
                return Err(StreamError::Cancelled { partial: String::new() });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Reads at most `ERROR_BODY_LIMIT` bytes for the error message. A body that
/// stalls is cut off after `ERROR_BODY_TIMEOUT` with whatever arrived.
async fn read_error_body(mut body: ByteStream) -> String {
    let mut collected = Vec::new();
    let read = async {
        while let Some(Ok(chunk)) = body.next().await {
            let room = ERROR_BODY_LIMIT.saturating_sub(collected.len());
            collected.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if collected.len() >= ERROR_BODY_LIMIT {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await;
    String::from_utf8_lossy(&collected).trim().to_string()
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    let aborted = rx.wait_for(|aborted| *aborted).await.is_ok();
    if !aborted {
        std::future::pending::<()>().await;
    }
}
