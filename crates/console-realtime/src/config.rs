use std::sync::Arc;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::errors::ConsoleError;

/// Read-only source of the bearer token.
///
/// The token is owned and refreshed elsewhere; clients read it again on
/// every request or connection attempt.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Token that never changes.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        let token = self.0.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// Configuration shared by the assistant stream client and the push socket.
#[derive(Clone)]
pub struct ConsoleConfig {
    /// Base URL of the console API, e.g. `https://console.example.com`.
    pub base_url: String,
    /// Bearer token source for both HTTP and socket auth.
    pub token: Arc<dyn TokenSource>,
    /// Bound on establishing a connection (DNS, TCP, TLS, response headers or
    /// the socket handshake).
    pub request_timeout: Duration,
    /// Connection-level retry for streaming requests.
    pub stream_retry: Backoff,
    /// Reconnect policy for the push socket.
    pub reconnect: Backoff,
}

impl std::fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.token().is_some())
            .field("request_timeout", &self.request_timeout)
            .field("stream_retry", &self.stream_retry)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl ConsoleConfig {
    /// Creates a config with default retry settings: 3 stream retries and 5
    /// socket reconnects, both with a one second base delay.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Arc::new(StaticToken(String::new())),
            request_timeout: Duration::from_secs(30),
            stream_retry: Backoff::exponential(3, Duration::from_secs(1)),
            reconnect: Backoff::exponential(5, Duration::from_secs(1)),
        }
    }

    /// Builds a config from `CONSOLE_*` environment variables.
    ///
    /// - `CONSOLE_BASE_URL` (required)
    /// - `CONSOLE_TOKEN`
    /// - `CONSOLE_REQUEST_TIMEOUT_SECS`
    /// - `CONSOLE_STREAM_MAX_RETRIES`, `CONSOLE_STREAM_RETRY_BASE_MS`
    /// - `CONSOLE_WS_MAX_RECONNECTS`, `CONSOLE_WS_RECONNECT_BASE_MS`
    pub fn from_env() -> Result<Self, ConsoleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConsoleError> {
        let base_url = lookup("CONSOLE_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ConsoleError::Config(
                "missing CONSOLE_BASE_URL for console client".into(),
            ));
        }
        let mut config = Self::new(base_url.trim());
        if let Some(token) = lookup("CONSOLE_TOKEN") {
            config = config.token(token);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CONSOLE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "CONSOLE_STREAM_MAX_RETRIES")? {
            config.stream_retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CONSOLE_STREAM_RETRY_BASE_MS")? {
            config.stream_retry.base_ms = ms;
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "CONSOLE_WS_MAX_RECONNECTS")? {
            config.reconnect.max_retries = attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CONSOLE_WS_RECONNECT_BASE_MS")? {
            config.reconnect.base_ms = ms;
        }
        Ok(config)
    }

    /// Uses a fixed bearer token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Arc::new(StaticToken(token.into()));
        self
    }

    /// Uses an externally maintained token source.
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token = source;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stream_retry(mut self, backoff: Backoff) -> Self {
        self.stream_retry = backoff;
        self
    }

    pub fn reconnect(mut self, backoff: Backoff) -> Self {
        self.reconnect = backoff;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConsoleError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConsoleError::Config(format!("invalid value for {key}: {raw:?}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn missing_base_url_is_config_error() {
        let err = ConsoleConfig::from_lookup(lookup(&[])).expect_err("should fail");
        assert!(matches!(err, ConsoleError::Config(msg) if msg.contains("CONSOLE_BASE_URL")));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ConsoleConfig::from_lookup(lookup(&[
            ("CONSOLE_BASE_URL", "https://console.test/"),
            ("CONSOLE_TOKEN", "abc"),
            ("CONSOLE_STREAM_MAX_RETRIES", "1"),
            ("CONSOLE_WS_RECONNECT_BASE_MS", "250"),
        ]))
        .expect("config");
        assert_eq!(config.token.token().as_deref(), Some("abc"));
        assert_eq!(config.stream_retry.max_retries, 1);
        assert_eq!(config.stream_retry.base_ms, 1_000);
        assert_eq!(config.reconnect.max_retries, 5);
        assert_eq!(config.reconnect.base_ms, 250);
        assert_eq!(
            config.endpoint("/assistant/chat/stream"),
            "https://console.test/assistant/chat/stream"
        );
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let err = ConsoleConfig::from_lookup(lookup(&[
            ("CONSOLE_BASE_URL", "http://localhost:8000"),
            ("CONSOLE_WS_MAX_RECONNECTS", "lots"),
        ]))
        .expect_err("should fail");
        assert!(matches!(err, ConsoleError::Config(msg) if msg.contains("CONSOLE_WS_MAX_RECONNECTS")));
    }

    #[test]
    fn blank_static_token_reads_as_missing() {
        assert_eq!(StaticToken("  ".into()).token(), None);
    }

    #[test]
    fn closures_are_token_sources() {
        let source: Arc<dyn TokenSource> = Arc::new(|| Some("rotating".to_string()));
        assert_eq!(source.token().as_deref(), Some("rotating"));
    }
}
