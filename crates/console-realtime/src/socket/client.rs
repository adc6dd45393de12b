use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::handlers::Handlers;
use super::message::PushMessage;
use super::transport::{NORMAL_CLOSURE, SocketConnection, SocketConnector, SocketEvent, WsConnector};
use crate::backoff::{Backoff, RetryState};
use crate::config::{ConsoleConfig, TokenSource};
use crate::errors::{ConsoleError, SocketError};

/// Lifecycle of the push socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

/// Builds `ws(s)://<host>[/<base path>]/ws/<token>` from the HTTP base URL.
pub fn socket_url(base_url: &str, token: &str) -> Result<String, SocketError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| SocketError::InvalidUrl(format!("{base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SocketError::InvalidUrl(format!(
                "unsupported scheme {other:?} in {base_url}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SocketError::InvalidUrl(format!("cannot use {scheme} for {base_url}")))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| SocketError::InvalidUrl(format!("{base_url} cannot be a base")))?
        .pop_if_empty()
        .push("ws")
        .push(token);
    Ok(url.into())
}

struct Control {
    /// Bumped by every connect cycle and every disconnect; a driver whose
    /// generation is stale may not touch the state.
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
}

struct Inner {
    client_id: uuid::Uuid,
    base_url: String,
    token: Arc<dyn TokenSource>,
    reconnect: Backoff,
    connector: Arc<dyn SocketConnector>,
    handlers: Handlers,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes `state` if `generation` is still current.
    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let control = self.control();
        if control.generation != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    async fn open(&self) -> Result<Box<dyn SocketConnection>, SocketError> {
        let token = self.token.token().ok_or(SocketError::MissingToken)?;
        let url = socket_url(&self.base_url, &token)?;
        self.connector.connect(&url).await
    }
}

/// Push-notification socket with bounded automatic reconnection.
///
/// Only [`disconnect`](Self::disconnect) (or dropping the client) ends a
/// connection cycle for good; any close other than 1000 schedules a reconnect
/// until the backoff policy is exhausted.
pub struct SocketClient {
    inner: Arc<Inner>,
}

impl SocketClient {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new(config.request_timeout)))
    }

    pub fn with_connector(config: &ConsoleConfig, connector: Arc<dyn SocketConnector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                client_id: uuid::Uuid::new_v4(),
                base_url: config.base_url.clone(),
                token: config.token.clone(),
                reconnect: config.reconnect.clone(),
                connector,
                handlers: Handlers::default(),
                state,
                control: Mutex::new(Control {
                    generation: 0,
                    cancel: None,
                }),
            }),
        }
    }

    pub fn client_id(&self) -> uuid::Uuid {
        self.inner.client_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn on_message(&self, f: impl Fn(&PushMessage) + Send + Sync + 'static) {
        self.inner.handlers.set_message(Arc::new(f));
    }

    /// `f(job_id, status, progress)` for every message carrying a job status.
    pub fn on_status_change(&self, f: impl Fn(i64, &str, f64) + Send + Sync + 'static) {
        self.inner.handlers.set_status_change(Arc::new(f));
    }

    pub fn on_error(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.handlers.set_error(Arc::new(f));
    }

    /// Opens the socket and resolves once it is established.
    ///
    /// Returns immediately when a connection is already open or being
    /// established. If the first attempt fails the error is returned and the
    /// client keeps reconnecting in the background.
    pub async fn connect(&self) -> Result<(), ConsoleError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut control = self.inner.control();
            if *self.inner.state.borrow() != ConnectionState::Disconnected {
                return Ok(());
            }
            control.generation += 1;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            control.cancel = Some(cancel_tx);
            self.inner.state.send_replace(ConnectionState::Connecting);
            tokio::spawn(drive(
                self.inner.clone(),
                control.generation,
                cancel_rx,
                ready_tx,
            ));
        }
        match ready_rx.await {
            Ok(result) => result.map_err(ConsoleError::from),
            Err(_) => Err(SocketError::Disconnected.into()),
        }
    }

    /// Closes with code 1000 and stops automatic reconnection, including a
    /// reconnect that is currently waiting out its backoff.
    pub fn disconnect(&self) {
        let mut control = self.inner.control();
        control.generation += 1;
        if let Some(cancel) = control.cancel.take() {
            let _ = cancel.send(true);
        }
        if self.inner.state.send_replace(ConnectionState::Disconnected)
            != ConnectionState::Disconnected
        {
            info!(client_id = %self.inner.client_id, "push socket disconnected by client");
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // a dropped sender also means the cycle is over
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// One connect cycle: connect, pump messages, reconnect on abnormal close.
async fn drive(
    inner: Arc<Inner>,
    generation: u64,
    mut cancel: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<(), SocketError>>,
) {
    let client_id = inner.client_id;
    let mut ready = Some(ready);
    let mut retry = RetryState::new(inner.reconnect.max_retries);

    loop {
        let opened = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return,
            opened = inner.open() => opened,
        };

        match opened {
            Ok(mut conn) => {
                if !inner.set_state(generation, ConnectionState::Connected) {
                    conn.close(NORMAL_CLOSURE, "client disconnect").await;
                    return;
                }
                retry.reset();
                info!(client_id = %client_id, "push socket connected");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }

                let code = loop {
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => {
                            conn.close(NORMAL_CLOSURE, "client disconnect").await;
                            return;
                        }
                        event = conn.next_event() => match event {
                            SocketEvent::Text(text) => inner.handlers.dispatch(&text),
                            SocketEvent::Closed { code } => break code,
                        },
                    }
                };
                if code == NORMAL_CLOSURE {
                    info!(client_id = %client_id, close_code = code, "push socket closed normally");
                    inner.set_state(generation, ConnectionState::Disconnected);
                    return;
                }
                warn!(client_id = %client_id, close_code = code, "push socket closed abnormally");
            }
            Err(err @ (SocketError::MissingToken | SocketError::InvalidUrl(_))) => {
                warn!(client_id = %client_id, error = %err, "push socket cannot connect");
                inner.set_state(generation, ConnectionState::Disconnected);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(err));
                }
                return;
            }
            Err(err) => {
                warn!(client_id = %client_id, attempt = retry.attempt, error = %err, "push socket connect failed");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(err));
                }
            }
        }

        if retry.exhausted() {
            warn!(client_id = %client_id, attempts = retry.attempt, "push socket reconnect attempts exhausted");
            inner.set_state(generation, ConnectionState::Disconnected);
            return;
        }
        let delay = retry.next_delay(&inner.reconnect);
        let attempt = retry.attempt;
        if !inner.set_state(generation, ConnectionState::Reconnecting { attempt }) {
            return;
        }
        debug!(client_id = %client_id, attempt, delay_ms = delay.as_millis() as u64, "scheduling push socket reconnect");
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return,
            _ = tokio::time::sleep(delay) => {}
        }
        if !inner.set_state(generation, ConnectionState::Connecting) {
            return;
        }
    }
}
