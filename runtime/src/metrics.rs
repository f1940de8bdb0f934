//! Prometheus metrics for loop observability.
//!
//! Covers the three instrumented layers:
//! - Floodgate event flow (enqueued, applied, cancelled, reduce latency)
//! - Feedback effect lifecycle (started, cancelled)
//! - Loop lifecycle (live gauge, starts, external sends)
//!
//! # Example
//!
//! ```rust,no_run
//! use feedback_loop_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! // ... run loops ...
//! if let Some(snapshot) = exporter.render() {
//!     println!("{snapshot}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

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

/// Process-global Prometheus recorder with a render handle.
///
/// There is no HTTP endpoint here; callers render on demand and expose
/// the text themselves (the pagination demo dumps it at exit).
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (common in test binaries), this
    /// warns and returns an exporter without a render handle; metrics
    /// still flow to the recorder installed first.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            // Latency histograms share one bucket ladder
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("metrics recorder already initialized, reusing it");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every metric series the runtime emits.
pub fn register_metrics() {
    // Floodgate
    describe_counter!(
        "floodgate.events.enqueued",
        "Events accepted into the pending queue"
    );
    describe_counter!(
        "floodgate.events.applied",
        "Events applied by the reducer"
    );
    describe_counter!(
        "floodgate.events.cancelled",
        "Queued events purged by token before application"
    );
    describe_histogram!(
        "floodgate.reduce.duration_seconds",
        "Time spent in a single reducer application"
    );

    // Feedback effects
    describe_counter!(
        "feedback.effects.started",
        "Effect runs started by feedback engines"
    );
    describe_counter!(
        "feedback.effects.cancelled",
        "Effect runs superseded or cancelled before completion"
    );

    // Loop lifecycle
    describe_gauge!("loop.live", "Feedback loops currently alive");
    describe_counter!("loop.started", "Feedback loops bootstrapped");
    describe_counter!(
        "loop.events.sent",
        "Events fed through FeedbackLoop::send"
    );
}
