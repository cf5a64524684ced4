//! Prometheus metrics.
//!
//! Metric names recorded across the workspace:
//! - Cache-aside repository: hits, misses, operation counts and latency
//! - Event emission and consumption
//! - Notification outcomes
//!
//! The recorder is process-global. Binaries install it once at startup and
//! expose [`MetricsRecorder::render`] on `GET /metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use book_exchange_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let body = recorder.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Describe every metric and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed
    /// in this process.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Cache-aside repository
    describe_counter!("cache_hits_total", "Cache lookups served from the cache");
    describe_counter!("cache_misses_total", "Cache lookups that fell through to the store");
    describe_counter!("cache_operations_total", "Cache get/set/del operations");
    describe_histogram!(
        "cache_operation_duration_seconds",
        "Time taken by cache operations"
    );

    // Document store
    describe_histogram!(
        "store_operation_duration_seconds",
        "Time taken by document store operations"
    );

    // Event emission
    describe_counter!("events_published_total", "Events accepted by the bus");
    describe_histogram!(
        "event_bus_publish_duration_seconds",
        "Time until the broker acknowledged a publish"
    );
    describe_counter!(
        "event_publish_failures_total",
        "Events dropped because the bus was degraded"
    );

    // Event consumption
    describe_counter!(
        "event_bus_messages_consumed_total",
        "Messages taken off the bus by consumers"
    );
    describe_counter!(
        "event_bus_consume_errors_total",
        "Errors reading from a subscription stream"
    );

    // Notifications
    describe_counter!("notifications_delivered_total", "E-mails handed to the sink");
    describe_counter!(
        "notifications_dropped_total",
        "Events dropped by the notification orchestrator, by reason"
    );
    describe_histogram!(
        "notification_delivery_duration_seconds",
        "Time from receipt to delivery of a notification"
    );
}
