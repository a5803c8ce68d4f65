//! Remote job service abstraction

use crate::error::ServiceError;
use crate::types::{ApiToken, JobHandle, JobRequest, ModelRef, Prediction};
use async_trait::async_trait;
use std::time::Duration;

/// A job creation request as sent to the remote service
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub model: ModelRef,
    pub input: JobRequest,
    /// Request timeout for the create call
    pub timeout: Duration,
    /// Ask the service to hold the create call open until the job finishes
    pub sync_wait: Option<Duration>,
}

/// Bytes fetched from a job output URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Trait for remote asynchronous job services
///
/// Every call that touches a job carries the token it was created with, so
/// one handle is never queried under a different authorization context.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Get the name of this service
    fn name(&self) -> &str;

    /// Create a job and return its initial snapshot
    async fn create(
        &self,
        token: &ApiToken,
        submission: &Submission,
    ) -> Result<Prediction, ServiceError>;

    /// Fetch the current snapshot of a job
    async fn get(
        &self,
        token: &ApiToken,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<Prediction, ServiceError>;

    /// Ask the service to stop a job
    async fn cancel(&self, token: &ApiToken, handle: &JobHandle) -> Result<(), ServiceError>;

    /// Download a finished job's output file
    async fn download(&self, url: &str, timeout: Duration) -> Result<Download, ServiceError>;
}
