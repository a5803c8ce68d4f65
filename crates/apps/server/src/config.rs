use anyhow::Context;
use dreamy_jobs::client::DEFAULT_BASE_URL;
use dreamy_jobs::variant::{CHAT_MODEL, DEFAULT_BASE_DELAY_MS, IMAGEN_MODEL, TRELLIS_VERSION};
use dreamy_jobs::{ApiToken, JobVariant, ModelRef, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the remote API credential.
pub const TOKEN_VAR: &str = "REPLICATE_API_TOKEN";

/// Configuration for the DreamyBot server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the server listens on (all interfaces).
    pub port: u16,
    /// Remote API credential; `None` makes every job endpoint answer 500.
    pub api_token: Option<ApiToken>,
    /// Root of the predictions API.
    pub base_url: String,
    pub generate_model: ModelRef,
    pub mesh_model: ModelRef,
    pub chat_model: ModelRef,
    /// Transient status-poll retries applied to every variant.
    pub poll_retries: u32,
    /// Interval of the metrics log line; `None` disables it.
    pub metrics_interval: Option<Duration>,
}

impl ServerConfig {
    /// Builds a configuration from environment variables, falling back to the
    /// public API and the stock models.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {value:?}"))?,
            None => 8080,
        };
        let api_token = lookup(TOKEN_VAR).and_then(ApiToken::new);
        let base_url = lookup("REPLICATE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());

        let generate_model = ModelRef::parse(
            &lookup("DREAMY_GENERATE_MODEL").unwrap_or_else(|| IMAGEN_MODEL.into()),
        );
        let mesh_model = ModelRef::parse(
            &lookup("DREAMY_MESH_VERSION").unwrap_or_else(|| TRELLIS_VERSION.into()),
        );
        let chat_model =
            ModelRef::parse(&lookup("DREAMY_CHAT_MODEL").unwrap_or_else(|| CHAT_MODEL.into()));

        let poll_retries = lookup("DREAMY_POLL_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let metrics_interval = lookup("DREAMY_METRICS_INTERVAL")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        anyhow::ensure!(!base_url.trim().is_empty(), "REPLICATE_BASE_URL must not be empty");

        Ok(Self {
            port,
            api_token,
            base_url,
            generate_model,
            mesh_model,
            chat_model,
            poll_retries,
            metrics_interval: (metrics_interval > 0).then(|| Duration::from_secs(metrics_interval)),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.poll_retries,
            Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        )
    }
}

/// Job configuration for each proxied endpoint.
#[derive(Debug, Clone)]
pub struct Variants {
    pub generate: Arc<JobVariant>,
    pub mesh: Arc<JobVariant>,
    pub chat: Arc<JobVariant>,
}

impl Variants {
    pub fn from_config(config: &ServerConfig) -> Self {
        let retry = config.retry_policy();
        Self {
            generate: Arc::new(JobVariant::generate(config.generate_model.clone()).with_retry(retry)),
            mesh: Arc::new(JobVariant::mesh(config.mesh_model.clone()).with_retry(retry)),
            chat: Arc::new(JobVariant::chat(config.chat_model.clone()).with_retry(retry)),
        }
    }
}
