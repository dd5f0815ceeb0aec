//! Logging and metrics bootstrap.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the tracing subscriber and the metrics recorder. Idempotent
/// enough for tests: a second call is a no-op for metrics and logging alike.
pub fn init(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "balltrack=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    if PROMETHEUS.get().is_none() {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing the metrics recorder")?;
        let _ = PROMETHEUS.set(handle);
    }
    Ok(())
}

/// Render all recorded metrics, for a shutdown summary.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS.get().map(|handle| handle.render())
}
