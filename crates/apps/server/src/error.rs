use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dreamy_jobs::JobError;
use serde_json::{json, Map, Value};

use crate::config::TOKEN_VAR;

/// How an endpoint shapes its error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{error, detail?}`
    Plain,
    /// `{ok: false, error, detail?}`
    Ok,
}

#[derive(Debug)]
enum Failure {
    Job(JobError),
    /// Body over the router's size limit
    TooLarge(String),
}

/// A failed proxied request, rendered as a JSON response
#[derive(Debug)]
pub struct ApiError {
    label: String,
    failure: Failure,
    envelope: Envelope,
}

impl ApiError {
    pub fn new(label: impl Into<String>, source: JobError) -> Self {
        Self {
            label: label.into(),
            failure: Failure::Job(source),
            envelope: Envelope::Plain,
        }
    }

    pub fn missing_input(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(label, JobError::MissingInput(message.into()))
    }

    pub fn too_large(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failure: Failure::TooLarge(detail.into()),
            envelope: Envelope::Plain,
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn status(&self) -> StatusCode {
        let source = match &self.failure {
            Failure::Job(source) => source,
            Failure::TooLarge(_) => return StatusCode::PAYLOAD_TOO_LARGE,
        };
        match source {
            JobError::MissingInput(_) => StatusCode::BAD_REQUEST,
            JobError::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
            JobError::PollingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // nobody is left to read it
            JobError::Cancelled(_) => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            JobError::MissingCredential
            | JobError::Submission { .. }
            | JobError::Transport { .. }
            | JobError::Output(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        let label = &self.label;
        let source = match &self.failure {
            Failure::Job(source) => source,
            Failure::TooLarge(detail) => {
                return self.wrap(json!({ "error": "Request body too large", "detail": detail }))
            }
        };
        let body = match source {
            JobError::MissingInput(message) => json!({ "error": message }),
            JobError::MissingCredential => json!({ "error": format!("{TOKEN_VAR} not set") }),
            JobError::Submission { message, detail } | JobError::Transport { message, detail } => {
                json!({
                    "error": format!("Failed to call {label}"),
                    "detail": detail.clone().unwrap_or_else(|| Value::String(message.clone())),
                })
            }
            JobError::UpstreamFailure { status, result } => json!({
                "error": format!("{label} {status}"),
                "detail": result,
            }),
            JobError::PollingTimeout { last, .. } => json!({
                "error": format!("{label} polling timeout"),
                "last": last,
            }),
            JobError::Cancelled(_) => json!({ "error": "Client closed request" }),
            JobError::Output(message) => json!({
                "error": format!("Failed to fetch {label} output"),
                "detail": message,
            }),
        };
        self.wrap(body)
    }

    fn wrap(&self, body: Value) -> Value {
        match (self.envelope, body) {
            (Envelope::Ok, Value::Object(fields)) => {
                let mut wrapped = Map::new();
                wrapped.insert("ok".into(), Value::Bool(false));
                wrapped.extend(fields);
                Value::Object(wrapped)
            }
            (_, body) => body,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.failure {
            Failure::TooLarge(detail) => {
                tracing::debug!(variant = %self.label, "rejected request: {}", detail)
            }
            Failure::Job(JobError::MissingInput(message)) => {
                tracing::debug!(variant = %self.label, "rejected request: {}", message)
            }
            Failure::Job(JobError::Cancelled(job)) => {
                tracing::debug!(variant = %self.label, job = %job, "request abandoned")
            }
            Failure::Job(err) => tracing::error!(
                variant = %self.label,
                status = status.as_u16(),
                detail = ?err.detail(),
                "{} error: {}",
                self.label,
                err
            ),
        }
        (status, Json(self.body())).into_response()
    }
}
