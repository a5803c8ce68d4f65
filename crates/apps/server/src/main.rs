use dreamy_jobs::{JobProxy, ProxyMetrics, ReplicateClient};
use dreamy_server::{
    config::{ServerConfig, TOKEN_VAR},
    metrics::start_metrics_reporter,
    router, AppState, Variants,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let metrics = Arc::new(ProxyMetrics::default());
    let service = Arc::new(ReplicateClient::new(config.base_url.clone()));
    let proxy = JobProxy::new(service, config.api_token.clone()).with_metrics(metrics.clone());
    if !proxy.has_credential() {
        tracing::warn!("{} not set; job endpoints will answer 500", TOKEN_VAR);
    }
    let state = AppState::new(proxy, Variants::from_config(&config));

    if let Some(period) = config.metrics_interval {
        tokio::spawn(start_metrics_reporter(metrics, period));
    }

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!("Server running on http://{}", config.bind_address());

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
