use tracing::debug;

use super::framer::EventFrame;
use super::payload::{PayloadAction, StreamPayload};

type TextCallback = Box<dyn FnMut(&str) + Send + 'static>;

/// Caller callbacks for one stream session. Each slot holds at most one handler.
#[derive(Default)]
pub struct StreamCallbacks {
    on_chunk: Option<TextCallback>,
    on_complete: Option<TextCallback>,
    on_error: Option<TextCallback>,
}

impl StreamCallbacks {
    /// Called with each content fragment, in stream order.
    pub fn on_chunk(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(f));
        self
    }

    /// Called once with the full accumulated text when the stream completes.
    pub fn on_complete(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called once with the error message when the stream fails.
    pub fn on_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Lifecycle of a stream session. Only `Active` accepts further payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Failed,
}

/// How a stream reached its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnding {
    /// The server sent an explicit `done` marker.
    Done,
    /// The byte source ended without a terminal marker; treated as success.
    Closed,
    /// The server sent an `error` payload.
    Failed(String),
}

/// Final result of a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Concatenation of every reported `content` fragment.
    pub text: String,
    pub ending: StreamEnding,
}

impl StreamOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.ending, StreamEnding::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.ending {
            StreamEnding::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Applies decoded payloads to the session state and fires callbacks.
///
/// Every terminal transition goes through `terminate`, so the completion and
/// error callbacks fire at most once and nothing fires after either of them.
pub struct FrameDispatcher {
    session_id: uuid::Uuid,
    state: SessionState,
    text: String,
    ending: Option<StreamEnding>,
    callbacks: StreamCallbacks,
}

impl FrameDispatcher {
    pub fn new(session_id: uuid::Uuid, callbacks: StreamCallbacks) -> Self {
        Self {
            session_id,
            state: SessionState::Active,
            text: String::new(),
            ending: None,
            callbacks,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Dispatches framed payloads in order until the session terminates.
    pub fn dispatch(&mut self, frames: Vec<EventFrame>) {
        for raw in frames.iter().flat_map(|frame| frame.data.iter()) {
            if !self.is_active() {
                return;
            }
            let Some(payload) = StreamPayload::parse(raw) else {
                debug!(session_id = %self.session_id, "dropping undecodable stream payload");
                continue;
            };
            match payload.action() {
                PayloadAction::Fail(message) => self.terminate(StreamEnding::Failed(message)),
                PayloadAction::Append(content) => self.append(&content),
                PayloadAction::Complete => self.terminate(StreamEnding::Done),
                PayloadAction::Ignore => {}
            }
        }
    }

    /// Best-effort handling of the flushed remainder: only `content` counts,
    /// anything else is silently dropped.
    pub fn dispatch_trailing(&mut self, frames: Vec<EventFrame>) {
        for raw in frames.iter().flat_map(|frame| frame.data.iter()) {
            if !self.is_active() {
                return;
            }
            if let Some(PayloadAction::Append(content)) =
                StreamPayload::parse(raw).map(StreamPayload::action)
            {
                self.append(&content);
            } else {
                debug!(session_id = %self.session_id, "ignoring trailing stream remainder");
            }
        }
    }

    /// Fails a session that never produced a stream (e.g. retries exhausted).
    pub fn fail(&mut self, message: impl Into<String>) {
        self.terminate(StreamEnding::Failed(message.into()));
    }

    /// Ends the session. A session still active at this point completes by
    /// implication.
    pub fn finish(mut self) -> StreamOutcome {
        if self.is_active() {
            self.terminate(StreamEnding::Closed);
        }
        StreamOutcome {
            text: self.text,
            ending: self.ending.unwrap_or(StreamEnding::Closed),
        }
    }

    /// Ends the session without firing any further callbacks and returns the
    /// partial text.
    pub fn cancel(self) -> String {
        self.text
    }

    fn append(&mut self, content: &str) {
        self.text.push_str(content);
        if let Some(on_chunk) = self.callbacks.on_chunk.as_mut() {
            on_chunk(content);
        }
    }

    fn terminate(&mut self, ending: StreamEnding) {
        if !self.is_active() {
            return;
        }
        match &ending {
            StreamEnding::Failed(message) => {
                self.state = SessionState::Failed;
                if let Some(on_error) = self.callbacks.on_error.as_mut() {
                    on_error(message);
                }
            }
            StreamEnding::Done | StreamEnding::Closed => {
                self.state = SessionState::Completed;
                if let Some(on_complete) = self.callbacks.on_complete.as_mut() {
                    on_complete(&self.text);
                }
            }
        }
        self.ending = Some(ending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::framer::Framer;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn callbacks(&self) -> StreamCallbacks {
            let chunks = self.events.clone();
            let completes = self.events.clone();
            let errors = self.events.clone();
            StreamCallbacks::default()
                .on_chunk(move |c| chunks.lock().unwrap().push(format!("chunk:{c}")))
                .on_complete(move |t| completes.lock().unwrap().push(format!("complete:{t}")))
                .on_error(move |e| errors.lock().unwrap().push(format!("error:{e}")))
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    fn run(wire: &[u8]) -> (StreamOutcome, Vec<String>) {
        let recorder = Recorder::default();
        let mut dispatcher = FrameDispatcher::new(uuid::Uuid::new_v4(), recorder.callbacks());
        let mut framer = Framer::new();
        dispatcher.dispatch(framer.feed(wire));
        dispatcher.dispatch_trailing(framer.flush());
        (dispatcher.finish(), recorder.events())
    }

    #[test]
    fn content_then_done_completes_once() {
        let (outcome, events) = run(
            b"data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: {\"done\":true}\n\n",
        );
        assert_eq!(outcome.text, "Hello");
        assert_eq!(outcome.ending, StreamEnding::Done);
        assert_eq!(events, vec!["chunk:Hel", "chunk:lo", "complete:Hello"]);
    }

    #[test]
    fn error_first_suppresses_later_content() {
        let (outcome, events) = run(
            b"data: {\"error\":\"x\"}\n\ndata: {\"content\":\"late\"}\n\ndata: {\"done\":true}\n\n",
        );
        assert_eq!(events, vec!["error:x"]);
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.error(), Some("x"));
    }

    #[test]
    fn repeated_terminal_payloads_fire_once() {
        let (_, events) = run(
            b"data: {\"done\":true}\n\ndata: {\"done\":true}\n\ndata: {\"error\":\"late\"}\n\n",
        );
        assert_eq!(events, vec!["complete:"]);
    }

    #[test]
    fn terminal_payload_stops_remaining_lines_of_same_frame() {
        let (_, events) = run(b"data: {\"done\":true}\ndata: {\"content\":\"after\"}\n\n");
        assert_eq!(events, vec!["complete:"]);
    }

    #[test]
    fn malformed_frames_are_skipped_without_ending_session() {
        let (outcome, events) =
            run(b"data: {not json\n\ndata: [DONE]\n\ndata: {\"content\":\"ok\"}\n\n");
        assert_eq!(outcome.text, "ok");
        assert_eq!(outcome.ending, StreamEnding::Closed);
        assert_eq!(events, vec!["chunk:ok", "complete:ok"]);
    }

    #[test]
    fn unterminated_trailing_content_is_reported_then_completion() {
        let (outcome, events) =
            run(b"data: {\"content\":\"a\"}\n\ndata: {\"content\":\"tail\"}");
        assert_eq!(outcome.text, "atail");
        assert_eq!(events, vec!["chunk:a", "chunk:tail", "complete:atail"]);
    }

    #[test]
    fn trailing_remainder_after_done_is_ignored() {
        let (outcome, events) =
            run(b"data: {\"done\":true}\n\ndata: {\"content\":\"tail\"}");
        assert_eq!(outcome.text, "");
        assert_eq!(events, vec!["complete:"]);
    }

    #[test]
    fn trailing_error_is_not_treated_as_terminal() {
        let (outcome, events) = run(b"data: {\"error\":\"tail\"}");
        assert_eq!(outcome.ending, StreamEnding::Closed);
        assert_eq!(events, vec!["complete:"]);
    }

    #[test]
    fn cancel_returns_partial_without_callbacks() {
        let recorder = Recorder::default();
        let mut dispatcher = FrameDispatcher::new(uuid::Uuid::new_v4(), recorder.callbacks());
        dispatcher.dispatch(vec![EventFrame {
            data: vec![r#"{"content":"part"}"#.into()],
        }]);
        assert_eq!(dispatcher.cancel(), "part");
        assert_eq!(recorder.events(), vec!["chunk:part"]);
    }

    #[test]
    fn fail_before_stream_fires_error_once() {
        let recorder = Recorder::default();
        let mut dispatcher = FrameDispatcher::new(uuid::Uuid::new_v4(), recorder.callbacks());
        dispatcher.fail("status 404");
        dispatcher.fail("again");
        let outcome = dispatcher.finish();
        assert_eq!(outcome.error(), Some("status 404"));
        assert_eq!(recorder.events(), vec!["error:status 404"]);
    }
}
