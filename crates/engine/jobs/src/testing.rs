//! Scripted in-memory job service for tests

use crate::error::ServiceError;
use crate::service::{Download, JobService, Submission};
use crate::types::{ApiToken, JobHandle, Prediction};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type Reply = Result<Prediction, ServiceError>;

/// A [`JobService`] that replays canned responses and records every call
///
/// Poll responses are consumed in order; once the script runs out the last
/// one repeats, so a job that never finishes is one `then_poll` away.
pub struct ScriptedService {
    creation: Reply,
    polls: Mutex<VecDeque<Reply>>,
    last_poll: Mutex<Option<Reply>>,
    download: Option<Download>,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
    tokens: Mutex<Vec<String>>,
    poll_times: Mutex<Vec<Instant>>,
}

fn prediction(payload: Value) -> Prediction {
    Prediction::from_payload(payload).expect("scripted payload must carry id and status")
}

impl ScriptedService {
    /// Service whose create call returns `payload`
    pub fn new(creation: Value) -> Self {
        Self::with_creation(Ok(prediction(creation)))
    }

    /// Service whose create call fails
    pub fn failing_creation(error: ServiceError) -> Self {
        Self::with_creation(Err(error))
    }

    fn with_creation(creation: Reply) -> Self {
        Self {
            creation,
            polls: Mutex::new(VecDeque::new()),
            last_poll: Mutex::new(None),
            download: None,
            create_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            poll_times: Mutex::new(Vec::new()),
        }
    }

    pub fn then_poll(self, payload: Value) -> Self {
        self.polls
            .lock()
            .unwrap()
            .push_back(Ok(prediction(payload)));
        self
    }

    pub fn then_poll_error(self, error: ServiceError) -> Self {
        self.polls.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_download(mut self, bytes: &[u8], content_type: &str) -> Self {
        self.download = Some(Download {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
        });
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Create + get + cancel calls
    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.get_calls() + self.cancel_calls()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Tokens presented on every call, in order
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    /// When each status poll arrived
    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }

    fn record_token(&self, token: &ApiToken) {
        self.tokens.lock().unwrap().push(token.expose().to_string());
    }
}

#[async_trait]
impl JobService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(
        &self,
        token: &ApiToken,
        submission: &Submission,
    ) -> Result<Prediction, ServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.submissions.lock().unwrap().push(submission.clone());
        self.creation.clone()
    }

    async fn get(
        &self,
        token: &ApiToken,
        _handle: &JobHandle,
        _timeout: Duration,
    ) -> Result<Prediction, ServiceError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.poll_times.lock().unwrap().push(Instant::now());

        let next = self.polls.lock().unwrap().pop_front();
        let mut last = self.last_poll.lock().unwrap();
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(ServiceError::new("no scripted poll response"))),
        }
    }

    async fn cancel(&self, token: &ApiToken, _handle: &JobHandle) -> Result<(), ServiceError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        Ok(())
    }

    async fn download(&self, url: &str, _timeout: Duration) -> Result<Download, ServiceError> {
        self.download
            .clone()
            .ok_or_else(|| ServiceError::new(format!("no scripted download for {}", url)))
    }
}
