//! Error types for the job proxy

use crate::types::JobStatus;
use serde_json::Value;
use std::time::Duration;

/// Failure reported by a [`JobService`](crate::service::JobService) call
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
    /// Raw error body from the remote service, when one was returned
    pub detail: Option<Value>,
    /// HTTP status of the remote response, if a response arrived at all
    pub status: Option<u16>,
    /// Connection failures, timeouts and 5xx responses
    pub transient: bool,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            status: None,
            transient: false,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// Outcomes of a proxied job other than success
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Required caller input is absent; no remote call was made
    #[error("{0}")]
    MissingInput(String),

    /// No credential configured; no remote call was made
    #[error("API token not configured")]
    MissingCredential,

    /// The create-job call failed
    #[error("Job submission failed: {message}")]
    Submission {
        message: String,
        detail: Option<Value>,
    },

    /// The remote job reached `failed` or `canceled`
    #[error("Remote job {status}")]
    UpstreamFailure { status: JobStatus, result: Value },

    /// Deadline passed while the job was still running
    #[error("Polling timeout after {elapsed:?}")]
    PollingTimeout { elapsed: Duration, last: Value },

    /// A status poll failed at the network level
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        detail: Option<Value>,
    },

    /// The caller went away and polling was abandoned
    #[error("Job {0} abandoned")]
    Cancelled(String),

    /// Fetching the finished job's output failed
    #[error("Output download failed: {0}")]
    Output(String),
}

/// Result type for job proxy operations
pub type Result<T> = std::result::Result<T, JobError>;

impl JobError {
    /// Raw remote payload or error body associated with this outcome
    pub fn detail(&self) -> Option<&Value> {
        match self {
            JobError::Submission { detail, .. } | JobError::Transport { detail, .. } => {
                detail.as_ref()
            }
            JobError::UpstreamFailure { result, .. } => Some(result),
            JobError::PollingTimeout { last, .. } => Some(last),
            _ => None,
        }
    }
}
