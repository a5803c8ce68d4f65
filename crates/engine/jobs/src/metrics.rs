use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide job proxy counters
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    pub jobs_submitted: AtomicU64,
    pub status_polls: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_timed_out: AtomicU64,
    pub jobs_abandoned: AtomicU64,
    pub submission_errors: AtomicU64,
    pub transport_errors: AtomicU64,
    pub rejected_requests: AtomicU64,
}

impl ProxyMetrics {
    pub fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self) {
        self.status_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.jobs_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_error(&self) {
        self.submission_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Missing input or missing credential
    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get Prometheus-compatible metrics as a string
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP jobs_submitted Total jobs submitted to the remote service\n\
             # TYPE jobs_submitted counter\n\
             jobs_submitted {}\n\
             \n\
             # HELP status_polls Total status polls issued\n\
             # TYPE status_polls counter\n\
             status_polls {}\n\
             \n\
             # HELP jobs_succeeded Total jobs that reached succeeded\n\
             # TYPE jobs_succeeded counter\n\
             jobs_succeeded {}\n\
             \n\
             # HELP jobs_failed Total jobs that reached failed or canceled\n\
             # TYPE jobs_failed counter\n\
             jobs_failed {}\n\
             \n\
             # HELP jobs_timed_out Total jobs abandoned at the polling deadline\n\
             # TYPE jobs_timed_out counter\n\
             jobs_timed_out {}\n\
             \n\
             # HELP jobs_abandoned Total jobs abandoned after the client went away\n\
             # TYPE jobs_abandoned counter\n\
             jobs_abandoned {}\n\
             \n\
             # HELP submission_errors Total failed job creation calls\n\
             # TYPE submission_errors counter\n\
             submission_errors {}\n\
             \n\
             # HELP transport_errors Total fatal status poll failures\n\
             # TYPE transport_errors counter\n\
             transport_errors {}\n\
             \n\
             # HELP rejected_requests Total requests rejected before any remote call\n\
             # TYPE rejected_requests counter\n\
             rejected_requests {}\n",
            self.jobs_submitted.load(Ordering::Relaxed),
            self.status_polls.load(Ordering::Relaxed),
            self.jobs_succeeded.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_timed_out.load(Ordering::Relaxed),
            self.jobs_abandoned.load(Ordering::Relaxed),
            self.submission_errors.load(Ordering::Relaxed),
            self.transport_errors.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
        )
    }

    /// Print metrics to the log
    pub fn print_stats(&self) {
        tracing::info!(
            "Jobs: {} | Polls: {} | Succeeded: {} | Failed: {} | Timed out: {} | Abandoned: {} | Rejected: {}",
            self.jobs_submitted.load(Ordering::Relaxed),
            self.status_polls.load(Ordering::Relaxed),
            self.jobs_succeeded.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_timed_out.load(Ordering::Relaxed),
            self.jobs_abandoned.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
        );
    }
}
