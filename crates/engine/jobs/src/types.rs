//! Types for remote job submissions and status snapshots

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Caller-supplied job input, forwarded to the remote service as `input`
pub type JobRequest = Map<String, Value>;

/// Normalized lifecycle state of a remote job
///
/// Backends use their own vocabulary ("starting", "processing", ...); every
/// value collapses onto one of these five states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Map a status string reported by the remote service
    ///
    /// Unknown values are treated as still running; the poll deadline
    /// bounds how long that can last.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" | "pending" => JobStatus::Pending,
            "processing" | "running" => JobStatus::Running,
            "succeeded" | "successful" | "completed" => JobStatus::Succeeded,
            "failed" | "error" => JobStatus::Failed,
            "canceled" | "cancelled" | "aborted" => JobStatus::Canceled,
            _ => JobStatus::Running,
        }
    }

    /// Check if no further transition can occur
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned by the remote service when a job is created
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a remote job as last reported by the service
///
/// Only `id` and `status` are extracted; `payload` keeps the full response
/// so it can be relayed to the caller unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: JobHandle,
    pub status: JobStatus,
    pub payload: Value,
}

impl Prediction {
    /// Extract id and status from a raw response body
    pub fn from_payload(payload: Value) -> Result<Self, String> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| "response is missing string field 'id'".to_string())?;
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| "response is missing string field 'status'".to_string())?;

        Ok(Self {
            id: JobHandle::new(id),
            status: JobStatus::from_remote(status),
            payload,
        })
    }

    /// The remote `output` field, if present and non-null
    pub fn output(&self) -> Option<&Value> {
        self.payload.get("output").filter(|v| !v.is_null())
    }

    /// First output URL: either `output` itself or the first string in an
    /// `output` array
    pub fn first_output_url(&self) -> Option<&str> {
        match self.output()? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// Which remote model a variant submits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// Pinned model version hash
    Version(String),
    /// Latest deployment of `owner/name`
    Model { owner: String, name: String },
}

impl ModelRef {
    pub fn version(version: impl Into<String>) -> Self {
        ModelRef::Version(version.into())
    }

    pub fn model(owner: impl Into<String>, name: impl Into<String>) -> Self {
        ModelRef::Model {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`, `owner/name:version` or a bare version hash
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some((_, version)) = value.split_once(':') {
            return ModelRef::version(version);
        }
        match value.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                ModelRef::model(owner, name)
            }
            _ => ModelRef::version(value),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Version(version) => write!(f, "version {}", version),
            ModelRef::Model { owner, name } => write!(f, "{}/{}", owner, name),
        }
    }
}

/// Credential for the remote job service
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Returns `None` for blank values
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}
