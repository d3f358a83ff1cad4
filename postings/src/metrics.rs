//! Prometheus metrics for the command side and the aggregation worker.
//!
//! Counters are recorded through the `metrics` facade wherever the event
//! happens; this module only describes them and installs the exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use job_postings::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
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

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Serve metrics on `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, started: false }
    }

    /// Describe all metrics, install the recorder and start the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_job_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                self.started = true;
                tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Whether this server installed the exporter.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }
}

/// Register all metric descriptions.
pub fn register_job_metrics() {
    // Command side
    describe_counter!(
        "job_commands_total",
        "Job commands handled, by command and outcome"
    );
    describe_counter!(
        "job_events_published_total",
        "Job events acknowledged by the event log, by event type"
    );
    describe_counter!(
        "job_publish_failures_total",
        "Job event publishes that failed, by reason (rejected, timeout)"
    );
    describe_histogram!(
        "job_publish_duration_seconds",
        "Time from publish call to acknowledgement or failure"
    );

    // Aggregation worker
    describe_counter!(
        "job_aggregator_events_total",
        "Events seen by the aggregation worker, by outcome (applied, skipped, failed)"
    );
    describe_counter!(
        "job_aggregator_stream_errors_total",
        "Transport errors received from the event subscription"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describing_without_a_recorder_is_harmless() {
        register_job_metrics();
        register_job_metrics();
    }

    #[test]
    fn new_server_is_not_started() {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(!server.is_started());
    }
}
