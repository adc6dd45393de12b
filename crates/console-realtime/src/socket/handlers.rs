use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::message::PushMessage;

type MessageHandler = Arc<dyn Fn(&PushMessage) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(i64, &str, f64) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-client handler slots. Registering a handler replaces the previous one.
#[derive(Default)]
pub(crate) struct Handlers {
    on_message: Mutex<Option<MessageHandler>>,
    on_status_change: Mutex<Option<StatusHandler>>,
    on_error: Mutex<Option<ErrorHandler>>,
}

fn slot<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Handlers {
    pub(crate) fn set_message(&self, f: MessageHandler) {
        *slot(&self.on_message) = Some(f);
    }

    pub(crate) fn set_status_change(&self, f: StatusHandler) {
        *slot(&self.on_status_change) = Some(f);
    }

    pub(crate) fn set_error(&self, f: ErrorHandler) {
        *slot(&self.on_error) = Some(f);
    }

    /// Decodes one text frame and fans it out to the registered handlers.
    ///
    /// Handlers are cloned out of their slots first so a handler may register
    /// another one without deadlocking.
    pub(crate) fn dispatch(&self, raw: &str) {
        let Some(msg) = PushMessage::parse(raw) else {
            debug!(len = raw.len(), "dropping malformed push message");
            return;
        };

        let on_message = slot(&self.on_message).clone();
        if let Some(f) = on_message {
            f(&msg);
        }

        if let Some((job_id, status, progress)) = msg.status_update() {
            let on_status = slot(&self.on_status_change).clone();
            if let Some(f) = on_status {
                f(job_id, status, progress);
            }
        }

        if msg.is_error() {
            let on_error = slot(&self.on_error).clone();
            if let Some(f) = on_error {
                f(msg.error_text());
            }
        }
    }
}
