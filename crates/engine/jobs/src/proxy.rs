//! Submit a remote job, poll it to a terminal state, and report the outcome

use crate::error::{JobError, Result, ServiceError};
use crate::metrics::ProxyMetrics;
use crate::service::{Download, JobService, Submission};
use crate::types::{ApiToken, JobHandle, JobRequest, JobStatus, Prediction};
use crate::variant::JobVariant;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A job accepted by the remote service, not yet awaited
#[derive(Debug, Clone)]
pub struct Submitted {
    pub handle: JobHandle,
    /// Snapshot returned by the create call
    pub initial: Prediction,
    /// Deadline anchor
    pub started_at: Instant,
}

/// Proxies jobs to a [`JobService`] under one configured credential
///
/// The proxy holds no per-job state; one instance serves every request.
pub struct JobProxy {
    service: Arc<dyn JobService>,
    token: Option<ApiToken>,
    metrics: Arc<ProxyMetrics>,
}

impl JobProxy {
    /// Create a proxy; a missing token is reported per request, before any
    /// remote call
    pub fn new(service: Arc<dyn JobService>, token: Option<ApiToken>) -> Self {
        Self {
            service,
            token,
            metrics: Arc::new(ProxyMetrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ProxyMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    /// Whether jobs can be submitted at all
    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self) -> Result<&ApiToken> {
        self.token.as_ref().ok_or_else(|| {
            self.metrics.record_rejected();
            JobError::MissingCredential
        })
    }

    /// Submit then await completion
    pub async fn run(
        &self,
        variant: &JobVariant,
        request: JobRequest,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let submitted = self.submit(variant, request).await?;
        self.await_completion(variant, submitted, cancel).await
    }

    /// Create the remote job
    pub async fn submit(&self, variant: &JobVariant, request: JobRequest) -> Result<Submitted> {
        if request.is_empty() {
            self.metrics.record_rejected();
            return Err(JobError::MissingInput("Missing job input".to_string()));
        }
        let token = self.token()?;

        let started_at = Instant::now();
        let submission = Submission {
            model: variant.model.clone(),
            input: request,
            timeout: variant.submit_timeout,
            sync_wait: variant.sync_wait,
        };

        let initial = self
            .service
            .create(token, &submission)
            .await
            .map_err(|err| {
                self.metrics.record_submission_error();
                error!(
                    variant = %variant.label,
                    model = %variant.model,
                    detail = ?err.detail,
                    "job submission failed: {}",
                    err
                );
                JobError::Submission {
                    message: err.message,
                    detail: err.detail,
                }
            })?;

        self.metrics.record_submitted();
        info!(
            job = %initial.id,
            variant = %variant.label,
            service = self.service.name(),
            status = %initial.status,
            "job submitted"
        );

        Ok(Submitted {
            handle: initial.id.clone(),
            initial,
            started_at,
        })
    }

    /// Poll until the job is terminal, the deadline passes, or `cancel` fires
    pub async fn await_completion(
        &self,
        variant: &JobVariant,
        submitted: Submitted,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let token = self.token()?;
        let Submitted {
            handle,
            initial,
            started_at,
        } = submitted;
        let deadline = started_at + variant.deadline;
        let mut last = initial;
        let mut polls = 0u32;

        while !last.status.is_terminal() {
            if Instant::now() >= deadline {
                self.metrics.record_timed_out();
                warn!(
                    job = %handle,
                    variant = %variant.label,
                    polls,
                    "polling deadline of {:?} passed with job {}",
                    variant.deadline,
                    last.status
                );
                return Err(JobError::PollingTimeout {
                    elapsed: started_at.elapsed(),
                    last: last.into_payload(),
                });
            }

            // the last wait ends on the deadline, never past it
            let wait = variant
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.abandon(variant, token, &handle).await);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            last = self.poll(variant, token, &handle, deadline, cancel).await?;
            polls += 1;
            debug!(job = %handle, status = %last.status, polls, "polled job");
        }

        match last.status {
            JobStatus::Succeeded => {
                self.metrics.record_succeeded();
                info!(
                    job = %handle,
                    variant = %variant.label,
                    polls,
                    elapsed = ?started_at.elapsed(),
                    "job succeeded"
                );
                Ok(last)
            }
            status => {
                self.metrics.record_failed();
                error!(
                    job = %handle,
                    variant = %variant.label,
                    detail = %last.payload,
                    "job {}",
                    status
                );
                Err(JobError::UpstreamFailure {
                    status,
                    result: last.into_payload(),
                })
            }
        }
    }

    /// One status poll, retried on transient failures as the variant allows
    async fn poll(
        &self,
        variant: &JobVariant,
        token: &ApiToken,
        handle: &JobHandle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let mut attempt = 0u32;

        loop {
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.abandon(variant, token, handle).await);
                }
                reply = self.service.get(token, handle, variant.poll_timeout) => reply,
            };
            self.metrics.record_poll();

            let err = match reply {
                Ok(prediction) => return Ok(prediction),
                Err(err) => err,
            };

            let delay = variant.retry.backoff_delay(attempt);
            if !self.should_retry(variant, &err, attempt, Instant::now() + delay, deadline) {
                self.metrics.record_transport_error();
                error!(
                    job = %handle,
                    variant = %variant.label,
                    attempt,
                    detail = ?err.detail,
                    "status poll failed: {}",
                    err
                );
                return Err(JobError::Transport {
                    message: err.message,
                    detail: err.detail,
                });
            }

            warn!(
                job = %handle,
                attempt,
                ?delay,
                "status poll failed, retrying: {}",
                err
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.abandon(variant, token, handle).await);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn should_retry(
        &self,
        variant: &JobVariant,
        err: &ServiceError,
        attempt: u32,
        resume_at: Instant,
        deadline: Instant,
    ) -> bool {
        err.transient && attempt < variant.retry.max_retries && resume_at < deadline
    }

    /// Stop tracking a job whose caller went away
    async fn abandon(&self, variant: &JobVariant, token: &ApiToken, handle: &JobHandle) -> JobError {
        self.metrics.record_abandoned();
        info!(job = %handle, variant = %variant.label, "client went away, abandoning job");

        if variant.cancel_on_abandon {
            if let Err(err) = self.service.cancel(token, handle).await {
                warn!(job = %handle, "remote cancel failed: {}", err);
            }
        }

        JobError::Cancelled(handle.to_string())
    }

    /// Fetch the first output file of a finished job
    pub async fn download_output(
        &self,
        variant: &JobVariant,
        prediction: &Prediction,
    ) -> Result<Download> {
        let url = prediction
            .first_output_url()
            .ok_or_else(|| JobError::Output("job produced no output URL".to_string()))?;

        self.service
            .download(url, variant.poll_timeout)
            .await
            .map_err(|err| {
                error!(job = %prediction.id, url, "output download failed: {}", err);
                JobError::Output(err.message)
            })
    }
}
