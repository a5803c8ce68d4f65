//! DreamyBot server crate.
//!
//! HTTP front end for the job proxy in `dreamy-jobs`: environment-driven
//! configuration, the axum router, and the mapping from job outcomes to
//! JSON responses.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;

pub use config::{ServerConfig, Variants};
pub use error::{ApiError, Envelope};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use dreamy_jobs::JobProxy;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted JSON body (2 MiB)
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<JobProxy>,
    pub variants: Arc<Variants>,
}

impl AppState {
    pub fn new(proxy: JobProxy, variants: Variants) -> Self {
        Self {
            proxy: Arc::new(proxy),
            variants: Arc::new(variants),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/generate", post(routes::generate))
        .route("/mesh", post(routes::mesh))
        .route("/chat", post(routes::chat))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
