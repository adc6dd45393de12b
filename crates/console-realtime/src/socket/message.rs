use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Value of `type` that marks a server-side error notification.
pub const ERROR_TYPE: &str = "error";

/// One inbound push notification.
///
/// Only `type` is required; everything else depends on the kind of event.
/// An optional field with an unexpected type reads as absent instead of
/// rejecting the whole message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub filename: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub queue_position: Option<u32>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Job ids also arrive as integral floats (`3.0`) or numeric strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

impl PushMessage {
    /// Decodes one text frame. `None` for anything that is not a JSON object
    /// with a string `type`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn push_kind(&self) -> PushKind {
        PushKind::from_type(&self.kind)
    }

    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.as_deref().map(JobStatus::from_status)
    }

    pub fn is_error(&self) -> bool {
        self.kind == ERROR_TYPE
    }

    /// `(job_id, status, progress)` when the message carries a job status.
    /// Missing progress reads as 0.
    pub fn status_update(&self) -> Option<(i64, &str, f64)> {
        let job_id = self.job_id?;
        let status = self.status.as_deref()?;
        Some((job_id, status, self.progress.unwrap_or(0.0)))
    }

    /// Text for the error handler: `message`, then `error`, then a default.
    pub fn error_text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("Unknown server error")
    }
}

/// Known values of the `type` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushKind {
    JobUploaded,
    JobQueued,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
    Error,
    Other(String),
}

impl PushKind {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "job_uploaded" => Self::JobUploaded,
            "job_queued" => Self::JobQueued,
            "job_started" => Self::JobStarted,
            "job_completed" => Self::JobCompleted,
            "job_failed" => Self::JobFailed,
            "job_cancelled" => Self::JobCancelled,
            ERROR_TYPE => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Known job lifecycle statuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    pub fn from_status(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}
