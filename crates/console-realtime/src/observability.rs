use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "console-realtime.logs.jsonl";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogSink {
    /// Compact human-readable lines on stderr; stdout stays free for output.
    Stderr,
    /// JSON lines appended to a file.
    JsonFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    filter: Option<String>,
    sink: LogSink,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("CONSOLE_OBSERVABILITY_ENABLED")
            .map(|v| parse_flag(&v).unwrap_or(true))
            .unwrap_or(true);
        let filter = lookup("CONSOLE_LOG_LEVEL").filter(|v| !v.trim().is_empty());
        let sink = match lookup("CONSOLE_JSON_LOG_PATH") {
            Some(path) if !path.trim().is_empty() => LogSink::JsonFile(PathBuf::from(path.trim())),
            _ => LogSink::Stderr,
        };
        Self {
            enabled,
            filter,
            sink,
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(level) = &self.filter
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    }
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the global `tracing` subscriber once per process.
///
/// - `CONSOLE_OBSERVABILITY_ENABLED`: set to `false`/`0`/`off` to install nothing.
/// - `CONSOLE_LOG_LEVEL`: filter directive (`debug`, `console_realtime=trace`, ...);
///   falls back to `RUST_LOG`, then `info`.
/// - `CONSOLE_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        match &settings.sink {
            LogSink::JsonFile(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Stderr => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        LogSettings::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn defaults_to_enabled_stderr() {
        let s = settings(&[]);
        assert!(s.enabled);
        assert_eq!(s.filter, None);
        assert_eq!(s.sink, LogSink::Stderr);
    }

    #[test]
    fn json_path_selects_file_sink() {
        let s = settings(&[
            ("CONSOLE_JSON_LOG_PATH", "logs/console.jsonl"),
            ("CONSOLE_LOG_LEVEL", "debug"),
        ]);
        assert_eq!(s.sink, LogSink::JsonFile(PathBuf::from("logs/console.jsonl")));
        assert_eq!(s.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn disable_flag_is_parsed_and_garbage_keeps_enabled() {
        assert!(!settings(&[("CONSOLE_OBSERVABILITY_ENABLED", "off")]).enabled);
        assert!(settings(&[("CONSOLE_OBSERVABILITY_ENABLED", "maybe")]).enabled);
    }

    #[test]
    fn bare_file_name_logs_to_current_dir() {
        let (dir, name) = split_log_path(Path::new("console.jsonl"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "console.jsonl");
    }
}
