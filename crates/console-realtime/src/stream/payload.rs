use serde::{Deserialize, Serialize};

/// Decoded body of a single `data:` line.
///
/// Fields never coexist in practice; when they do, `error` wins over
/// `content`, which wins over `done`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

/// What a payload asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadAction {
    Fail(String),
    Append(String),
    Complete,
    Ignore,
}

impl StreamPayload {
    /// Parses one payload; `None` for anything that is not a JSON object of
    /// the expected shape.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn action(self) -> PayloadAction {
        if let Some(error) = self.error {
            return PayloadAction::Fail(error);
        }
        if let Some(content) = self.content.filter(|c| !c.is_empty()) {
            return PayloadAction::Append(content);
        }
        if self.done == Some(true) {
            return PayloadAction::Complete;
        }
        PayloadAction::Ignore
    }
}
