//! Prometheus metrics endpoint.
//!
//! One recorder per process, installed through `OnceLock` so concurrent
//! initialization (multi-catalog startup, test threads) is safe. The HTTP
//! server exposes `/metrics` and `/health`.

use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::ResultExt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Histogram buckets for delivery durations (seconds).
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the recorder and start the metrics endpoint on `addr`.
///
/// Safe to call once per process; later calls are ignored (the first
/// recorder stays installed).
pub fn init(addr: SocketAddr) -> Result<(), MetricsError> {
    if install_recorder()? {
        tokio::spawn(run_server(addr));
        info!(%addr, "Metrics server started");
    }
    Ok(())
}

/// Install the recorder without an HTTP endpoint (tests).
pub fn init_test() {
    let _ = install_recorder();
}

/// Returns `Ok(true)` when this call installed the recorder.
fn install_recorder() -> Result<bool, MetricsError> {
    if HANDLE.get().is_some() {
        return Ok(false);
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .expect("valid bucket configuration")
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    Ok(HANDLE.set(handle).is_ok())
}

/// Render current metrics in Prometheus text format.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

async fn run_server(addr: SocketAddr) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind metrics server to {addr}: {e}");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {e}");
    }
}

async fn metrics_handler() -> String {
    render().unwrap_or_default()
}

async fn health_handler() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();

        counter!("drift_test_counter").increment(7);
        let output = render().unwrap();
        assert!(output.contains("drift_test_counter"));
    }
}
