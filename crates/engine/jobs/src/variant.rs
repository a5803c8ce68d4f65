//! Per-endpoint job configuration
//!
//! Every exposed endpoint runs the same submit/poll routine; a [`JobVariant`]
//! captures what differs between them: the remote model, fixed default input
//! parameters, and the timing constants.

use crate::types::{JobRequest, ModelRef};
use serde_json::{json, Value};
use std::time::Duration;

/// Default delay between status polls (2 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default timeout for a single create or status request (15 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default deadline for simple generation jobs (2 minutes)
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Deadline for mesh reconstruction jobs (3 minutes)
pub const MESH_DEADLINE: Duration = Duration::from_secs(180);

/// How long the chat variant asks the service to hold the create call open
pub const CHAT_SYNC_WAIT: Duration = Duration::from_secs(60);

/// Default base delay for exponential backoff (1 second)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Image generation model
pub const IMAGEN_MODEL: &str = "google/imagen-4-ultra";

/// Pinned Trellis image-to-3D version
pub const TRELLIS_VERSION: &str =
    "e8f6c45206993f297372f5436b90350817bd9b4a0d52d2a76df50c1c8afa2b3c";

/// Text generation model
pub const CHAT_MODEL: &str = "openai/gpt-4o";

/// Retry behaviour for transient status-poll failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Fail on the first transport error
    pub fn none() -> Self {
        Self::new(0, Duration::from_millis(DEFAULT_BASE_DELAY_MS))
    }

    /// Calculate exponential backoff delay for a retry attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Configuration for one proxied endpoint
#[derive(Debug, Clone)]
pub struct JobVariant {
    /// Name used in logs and error messages (e.g. "Trellis")
    pub label: String,
    pub model: ModelRef,
    /// Input parameters merged underneath the caller's input
    pub defaults: JobRequest,
    /// Input keys the caller may not set
    pub identity_fields: Vec<String>,
    pub poll_interval: Duration,
    /// Measured from submission
    pub deadline: Duration,
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
    pub sync_wait: Option<Duration>,
    pub retry: RetryPolicy,
    /// Ask the service to cancel the job when the caller goes away
    pub cancel_on_abandon: bool,
}

impl JobVariant {
    pub fn new(label: impl Into<String>, model: ModelRef) -> Self {
        Self {
            label: label.into(),
            model,
            defaults: JobRequest::new(),
            identity_fields: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            submit_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_timeout: DEFAULT_REQUEST_TIMEOUT,
            sync_wait: None,
            retry: RetryPolicy::none(),
            cancel_on_abandon: true,
        }
    }

    /// Plain image generation: caller input forwarded as-is
    pub fn generate(model: ModelRef) -> Self {
        Self::new("Imagen", model)
    }

    /// Image-to-3D reconstruction with fixed quality defaults
    pub fn mesh(model: ModelRef) -> Self {
        Self::new("Trellis", model)
            .with_default("texture_size", json!(2048))
            .with_default("mesh_simplify", json!(0.9))
            .with_default("generate_model", json!(true))
            .with_default("save_gaussian_ply", json!(true))
            .with_default("ss_sampling_steps", json!(38))
            .with_identity_field("images")
            .with_identity_field("generate_model")
            .with_deadline(MESH_DEADLINE)
    }

    /// Text generation; the service normally answers within the create call
    pub fn chat(model: ModelRef) -> Self {
        Self::new("Chat", model)
            .with_sync_wait(CHAT_SYNC_WAIT)
            .with_submit_timeout(CHAT_SYNC_WAIT + DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    pub fn with_identity_field(mut self, key: impl Into<String>) -> Self {
        self.identity_fields.push(key.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_sync_wait(mut self, wait: Duration) -> Self {
        self.sync_wait = Some(wait);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel_on_abandon(mut self, enabled: bool) -> Self {
        self.cancel_on_abandon = enabled;
        self
    }

    fn is_identity_field(&self, key: &str) -> bool {
        self.identity_fields.iter().any(|f| f == key)
    }

    /// Build the remote input: defaults, then caller parameters, then the
    /// endpoint-derived identity values
    ///
    /// Caller parameters naming an identity field are dropped.
    pub fn build_input(&self, caller: JobRequest, identity: JobRequest) -> JobRequest {
        let mut input = self.defaults.clone();

        for (key, value) in caller {
            if self.is_identity_field(&key) {
                tracing::warn!(
                    variant = %self.label,
                    field = %key,
                    "ignoring caller override of identity field"
                );
                continue;
            }
            input.insert(key, value);
        }

        input.extend(identity);
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> JobRequest {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_variant_defaults() {
        let variant = JobVariant::generate(ModelRef::parse(IMAGEN_MODEL));
        assert_eq!(variant.poll_interval, Duration::from_secs(2));
        assert_eq!(variant.deadline, Duration::from_secs(120));
        assert_eq!(variant.submit_timeout, Duration::from_secs(15));
        assert_eq!(variant.poll_timeout, Duration::from_secs(15));
        assert_eq!(variant.retry, RetryPolicy::none());
        assert!(variant.defaults.is_empty());
        assert!(variant.sync_wait.is_none());
    }

    #[test]
    fn test_mesh_preset() {
        let variant = JobVariant::mesh(ModelRef::version(TRELLIS_VERSION));
        assert_eq!(variant.deadline, Duration::from_secs(180));
        assert_eq!(variant.defaults["texture_size"], json!(2048));
        assert_eq!(variant.defaults["mesh_simplify"], json!(0.9));
        assert_eq!(variant.defaults["ss_sampling_steps"], json!(38));
        assert_eq!(variant.defaults["generate_model"], json!(true));
        assert_eq!(variant.defaults["save_gaussian_ply"], json!(true));
    }

    #[test]
    fn test_chat_preset_waits_synchronously() {
        let variant = JobVariant::chat(ModelRef::parse(CHAT_MODEL));
        assert_eq!(variant.sync_wait, Some(Duration::from_secs(60)));
        assert!(variant.submit_timeout > Duration::from_secs(60));
    }

    #[test]
    fn test_build_input_precedence() {
        let variant = JobVariant::mesh(ModelRef::version(TRELLIS_VERSION));
        let caller = map(json!({
            "texture_size": 1024,
            "seed": 7,
            "images": ["http://evil"],
            "generate_model": false
        }));
        let identity = map(json!({"images": ["http://cat.png"]}));

        let input = variant.build_input(caller, identity);

        assert_eq!(input["texture_size"], json!(1024));
        assert_eq!(input["seed"], json!(7));
        assert_eq!(input["mesh_simplify"], json!(0.9));
        assert_eq!(input["images"], json!(["http://cat.png"]));
        assert_eq!(input["generate_model"], json!(true));
    }

    #[test]
    fn test_build_input_without_defaults_is_verbatim() {
        let variant = JobVariant::generate(ModelRef::parse(IMAGEN_MODEL));
        let caller = map(json!({"prompt": "a cat", "aspect_ratio": "1:1"}));

        let input = variant.build_input(caller.clone(), JobRequest::new());
        assert_eq!(input, caller);
    }

    #[test]
    fn test_backoff_delay_calculation() {
        let retry = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(retry.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(retry.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(retry.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(retry.backoff_delay(3), Duration::from_millis(8000));
    }
}
