use dreamy_jobs::ProxyMetrics;
use std::sync::Arc;
use std::time::Duration;

/// Start metrics reporting task
pub async fn start_metrics_reporter(metrics: Arc<ProxyMetrics>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // first tick fires immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        metrics.print_stats();
    }
}
