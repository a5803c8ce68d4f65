//! Replicate-style predictions API client implementation

use crate::error::ServiceError;
use crate::service::{Download, JobService, Submission};
use crate::types::{ApiToken, JobHandle, ModelRef, Prediction};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Timeout for best-effort cancel requests (5 seconds)
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a predictions API
///
/// Jobs are created with `POST /predictions` (pinned version) or
/// `POST /models/{owner}/{name}/predictions` (latest model), and polled with
/// `GET /predictions/{id}`.
///
/// # Example
///
/// ```no_run
/// use dreamy_jobs::{ApiToken, JobHandle, JobService, ReplicateClient};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ReplicateClient::default();
///     let token = ApiToken::new("r8_...").expect("token");
///
///     let snapshot = client
///         .get(&token, &JobHandle::new("x1"), Duration::from_secs(15))
///         .await?;
///     println!("{} is {}", snapshot.id, snapshot.status);
///     Ok(())
/// }
/// ```
pub struct ReplicateClient {
    client: Client,
    base_url: String,
}

impl ReplicateClient {
    /// Create a new client for the given API root
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root including the version segment (e.g. "https://api.replicate.com/v1")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn create_url(&self, model: &ModelRef) -> String {
        match model {
            ModelRef::Version(_) => format!("{}/predictions", self.base_url),
            ModelRef::Model { owner, name } => {
                format!("{}/models/{}/{}/predictions", self.base_url, owner, name)
            }
        }
    }

    fn prediction_url(&self, handle: &JobHandle) -> String {
        format!("{}/predictions/{}", self.base_url, handle)
    }

    fn create_body(submission: &Submission) -> Value {
        match &submission.model {
            ModelRef::Version(version) => json!({
                "version": version,
                "input": submission.input,
            }),
            ModelRef::Model { .. } => json!({ "input": submission.input }),
        }
    }
}

impl Default for ReplicateClient {
    /// Create a client against the public API root
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl JobService for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn create(
        &self,
        token: &ApiToken,
        submission: &Submission,
    ) -> Result<Prediction, ServiceError> {
        let mut request = self
            .client
            .post(self.create_url(&submission.model))
            .header(AUTHORIZATION, bearer(token))
            .json(&Self::create_body(submission))
            .timeout(submission.timeout);

        if let Some(wait) = submission.sync_wait {
            request = request.header("Prefer", format!("wait={}", wait.as_secs()));
        }

        let response = request.send().await.map_err(transport_error)?;
        read_prediction(response).await
    }

    async fn get(
        &self,
        token: &ApiToken,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<Prediction, ServiceError> {
        let response = self
            .client
            .get(self.prediction_url(handle))
            .header(AUTHORIZATION, bearer(token))
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        read_prediction(response).await
    }

    async fn cancel(&self, token: &ApiToken, handle: &JobHandle) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}/cancel", self.prediction_url(handle)))
            .header(AUTHORIZATION, bearer(token))
            .timeout(CANCEL_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn download(&self, url: &str, timeout: Duration) -> Result<Download, ServiceError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.text().await.unwrap_or_default()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(transport_error)?;

        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

fn bearer(token: &ApiToken) -> String {
    format!("Bearer {}", token.expose())
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    let err = ServiceError::new(if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        "Failed to connect to remote service".to_string()
    } else {
        format!("HTTP request failed: {}", e)
    });

    if e.is_timeout() || e.is_connect() {
        err.transient()
    } else {
        err
    }
}

/// Error for a non-2xx response, keeping the body as structured detail when
/// it parses as JSON
fn status_error(status: reqwest::StatusCode, body: String) -> ServiceError {
    let detail = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
    let err = ServiceError::new(format!("Remote service returned {}", status))
        .with_status(status.as_u16())
        .with_detail(detail);

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        err.transient()
    } else {
        err
    }
}

async fn read_prediction(response: Response) -> Result<Prediction, ServiceError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(status_error(status, body));
    }

    let payload: Value = serde_json::from_str(&body).map_err(|e| {
        ServiceError::new(format!("Failed to parse prediction response: {}", e))
            .with_status(status.as_u16())
            .with_detail(Value::String(body.clone()))
    })?;

    Prediction::from_payload(payload).map_err(|e| {
        ServiceError::new(format!("Malformed prediction response: {}", e))
            .with_status(status.as_u16())
            .with_detail(Value::String(body))
    })
}
