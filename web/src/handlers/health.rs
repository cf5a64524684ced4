//! Liveness and metrics endpoints, mounted by every binary.

use axum::{Router, extract::State, http::StatusCode, routing::get};
use book_exchange_runtime::metrics::MetricsRecorder;

/// Liveness probe.
///
/// Returns 200 while the process is serving. Dependencies are not checked;
/// a store outage shows up as 503s on the service routes instead.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Prometheus scrape endpoint.
///
/// ```text
/// GET /metrics
/// ```
#[allow(clippy::unused_async)]
pub async fn metrics(State(recorder): State<MetricsRecorder>) -> String {
    recorder.render()
}

/// `GET /health`.
pub fn health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// `GET /metrics` over an installed recorder.
pub fn metrics_router(recorder: MetricsRecorder) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(recorder)
}
