//! Prometheus metrics for the request pipeline.
//!
//! Metrics are emitted through the `metrics` facade; without an installed
//! recorder they are no-ops. [`MetricsRecorder`] installs a Prometheus
//! recorder and renders the text exposition format.
//!
//! # Example
//!
//! ```rust,no_run
//! use hearth_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Logical calls settled, labelled by `outcome`
pub const REQUESTS_TOTAL: &str = "hearth_requests_total";
/// Callers collapsed onto an in-flight exchange
pub const DEDUP_HITS_TOTAL: &str = "hearth_dedup_hits_total";
/// Retry attempts after a retryable failure
pub const RETRIES_TOTAL: &str = "hearth_retries_total";
/// Admissions that had to wait for rate window space
pub const RATE_LIMIT_WAITS_TOTAL: &str = "hearth_rate_limit_waits_total";
/// End-to-end duration of a logical call
pub const REQUEST_DURATION_SECONDS: &str = "hearth_request_duration_seconds";
/// Exchanges currently holding a concurrency slot
pub const IN_FLIGHT_REQUESTS: &str = "hearth_in_flight_requests";

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

/// Installs the Prometheus recorder and renders scrapes.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not yet installed.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe the pipeline metrics and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. A second install is
    /// logged and treated as success; `render` then returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder was not the one installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of logical calls settled, by outcome");
    describe_counter!(
        DEDUP_HITS_TOTAL,
        "Total number of calls served by an identical in-flight exchange"
    );
    describe_counter!(RETRIES_TOTAL, "Total number of retry attempts");
    describe_counter!(
        RATE_LIMIT_WAITS_TOTAL,
        "Total number of admissions delayed by the rate window"
    );
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        "Time from call to settlement, including queueing and retries"
    );
    describe_gauge!(IN_FLIGHT_REQUESTS, "Exchanges currently holding a concurrency slot");
}

/// Pipeline metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a settled call.
    pub fn record_settled(outcome: &'static str, duration: Duration) {
        counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
        histogram!(REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Record a caller collapsed onto an in-flight exchange.
    pub fn record_dedup_hit() {
        counter!(DEDUP_HITS_TOTAL).increment(1);
    }

    /// Record a retry attempt.
    pub fn record_retry() {
        counter!(RETRIES_TOTAL).increment(1);
    }

    /// Record an admission that waited on the rate window.
    pub fn record_rate_limit_wait() {
        counter!(RATE_LIMIT_WAITS_TOTAL).increment(1);
    }

    /// A concurrency slot was taken.
    pub fn slot_acquired() {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
    }

    /// A concurrency slot was returned.
    pub fn slot_released() {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
