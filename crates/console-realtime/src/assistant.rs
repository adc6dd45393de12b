use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConsoleConfig, TokenSource};
use crate::errors::{ConsoleError, StreamError};
use crate::stream::{HttpTransport, StreamClient, StreamOutcome, StreamSession};

const CHAT_STREAM_PATH: &str = "/assistant/chat/stream";
const CHAT_PATH: &str = "/assistant/chat";

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of both chat endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(
        rename = "systemPrompt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn user_text(self, text: impl Into<String>) -> Self {
        self.message(ChatMessage::user(text))
    }

    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into());
        self
    }

    /// Drops blank messages and a blank system prompt, then checks that at
    /// least one user message is left.
    pub fn validated(self) -> Result<Self, ConsoleError> {
        if self.messages.is_empty() {
            return Err(ConsoleError::Validation(
                "at least one message is required".into(),
            ));
        }
        let messages: Vec<ChatMessage> = self
            .messages
            .into_iter()
            .filter(|m| !m.content.trim().is_empty())
            .collect();
        if !messages.iter().any(|m| m.role == ChatRole::User) {
            return Err(ConsoleError::Validation(
                "chat requires at least one user message".into(),
            ));
        }
        Ok(Self {
            messages,
            system_prompt: self.system_prompt.filter(|s| !s.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    reply: String,
}

/// Client for the assistant chat endpoints.
pub struct AssistantClient {
    config: ConsoleConfig,
    streams: StreamClient,
    http: reqwest::Client,
}

impl AssistantClient {
    pub fn new(config: ConsoleConfig) -> Result<Self, ConsoleError> {
        let transport = HttpTransport::new(config.request_timeout)?;
        let streams = StreamClient::new(Arc::new(transport), config.stream_retry.clone());
        Ok(Self::with_stream_client(config, streams))
    }

    /// Uses a caller-supplied stream client (custom transport or policy).
    pub fn with_stream_client(config: ConsoleConfig, streams: StreamClient) -> Self {
        Self {
            config,
            streams,
            http: reqwest::Client::new(),
        }
    }

    /// New session to attach callbacks to before calling
    /// [`chat_stream`](Self::chat_stream).
    pub fn session(&self) -> StreamSession {
        self.streams.session()
    }

    /// Streams an assistant reply through `session`.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        session: StreamSession,
    ) -> Result<StreamOutcome, ConsoleError> {
        let request = request.validated()?;
        let mut headers = auth_headers(self.config.token.as_ref())?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        debug!(session_id = %session.session_id(), messages = request.messages.len(), "starting assistant chat stream");
        let outcome = session
            .open(self.config.endpoint(CHAT_STREAM_PATH), &request, headers)
            .await?;
        Ok(outcome)
    }

    /// Non-streaming chat; returns the whole reply.
    pub async fn chat(&self, request: ChatRequest) -> Result<String, ConsoleError> {
        let request = request.validated()?;
        let response = self
            .http
            .post(self.config.endpoint(CHAT_PATH))
            .headers(auth_headers(self.config.token.as_ref())?)
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("assistant chat request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ConsoleError::protocol_msg(format!("invalid assistant reply: {e}")))?;
        Ok(reply.reply)
    }
}

fn auth_headers(token: &dyn TokenSource) -> Result<HeaderMap, ConsoleError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token.token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConsoleError::Config("bearer token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_system_prompt_in_camel_case() {
        let body = serde_json::to_value(
            ChatRequest::new()
                .user_text("What was decided?")
                .system_prompt("Be brief."),
        )
        .expect("json");
        assert_eq!(
            body,
            serde_json::json!({
                "messages": [{"role": "user", "content": "What was decided?"}],
                "systemPrompt": "Be brief."
            })
        );
    }

    #[test]
    fn validation_requires_a_user_message() {
        let err = ChatRequest::new()
            .message(ChatMessage::assistant("hello"))
            .validated()
            .expect_err("no user message");
        assert!(matches!(err, ConsoleError::Validation(msg) if msg.contains("user message")));

        let err = ChatRequest::new().validated().expect_err("empty");
        assert!(matches!(err, ConsoleError::Validation(msg) if msg.contains("at least one message")));
    }

    #[test]
    fn validation_drops_blank_messages_and_prompt() {
        let request = ChatRequest::new()
            .user_text("   ")
            .user_text("summary please")
            .system_prompt("  ")
            .validated()
            .expect("valid");
        assert_eq!(request.messages, vec![ChatMessage::user("summary please")]);
        assert_eq!(request.system_prompt, None);
    }

    #[test]
    fn blank_only_user_messages_are_rejected() {
        assert!(ChatRequest::new().user_text(" ").validated().is_err());
    }

    #[test]
    fn auth_header_is_omitted_without_token() {
        let headers = auth_headers(&crate::config::StaticToken(String::new())).expect("headers");
        assert!(headers.get(AUTHORIZATION).is_none());
        let headers = auth_headers(&crate::config::StaticToken("t0k".into())).expect("headers");
        assert_eq!(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer t0k"));
    }
}
