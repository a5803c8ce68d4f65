//! Asynchronous remote job proxy for DreamyBot
//!
//! This crate submits long-running inference jobs (image generation, image-to-3D
//! reconstruction, chat completion) to a predictions-style API, polls them on a
//! fixed interval under a wall-clock deadline, and hands back the remote result
//! untouched.
//!
//! # Features
//!
//! - **HTTP Client**: Async client for the predictions API
//! - **Variants**: One parameterized routine, configured per endpoint
//! - **Deadlines**: Every poll loop is bounded; timeouts carry the last snapshot
//! - **Cancellation**: Polling stops and the remote job is cancelled when the caller goes away
//! - **Retry Logic**: Optional exponential backoff for transient poll failures
//!
//! # Example
//!
//! ```no_run
//! use dreamy_jobs::{ApiToken, JobProxy, JobVariant, ModelRef, ReplicateClient};
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxy = JobProxy::new(
//!         Arc::new(ReplicateClient::default()),
//!         ApiToken::new(std::env::var("REPLICATE_API_TOKEN")?),
//!     );
//!     let variant = JobVariant::generate(ModelRef::parse("google/imagen-4-ultra"));
//!
//!     let mut input = serde_json::Map::new();
//!     input.insert("prompt".into(), json!("a cat"));
//!
//!     let result = proxy.run(&variant, input, &CancellationToken::new()).await?;
//!     println!("{}", result.payload);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod service;
pub mod types;
pub mod variant;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ReplicateClient;
pub use error::{JobError, Result, ServiceError};
pub use metrics::ProxyMetrics;
pub use proxy::{JobProxy, Submitted};
pub use service::{Download, JobService, Submission};
pub use types::{ApiToken, JobHandle, JobRequest, JobStatus, ModelRef, Prediction};
pub use variant::{JobVariant, RetryPolicy};
