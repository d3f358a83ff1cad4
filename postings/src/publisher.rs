//! Publishing job events to the event log.
//!
//! One publish call is one append attempt. Nothing here retries: a failed or
//! unacknowledged publish goes straight back to the command that issued it,
//! and retrying is the caller's decision (it may produce a duplicate event).

use crate::events::RecordedJobEvent;
use job_postings_core::event_bus::EventBus;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A publish did not end in a confirmed append.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The event could not be encoded; nothing was sent.
    #[error("Failed to encode job event: {0}")]
    Encoding(String),

    /// The log refused the append or could not be reached.
    #[error("Event log rejected publish: {0}")]
    Rejected(String),

    /// No acknowledgement within the deadline. The event may or may not
    /// have been appended.
    #[error("Publish not acknowledged within {0:?}")]
    Timeout(Duration),
}

impl PublishError {
    /// Whether the event may have been appended despite the error.
    #[must_use]
    pub const fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Appends job events to the per-key ordered log.
///
/// Sequential publishes for the same key from one caller are appended in
/// call order.
pub trait JobEventPublisher: Send + Sync {
    /// Append `event` under its key.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] unless the append was acknowledged.
    fn publish<'a>(
        &'a self,
        event: &'a RecordedJobEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

/// [`JobEventPublisher`] over any [`EventBus`].
pub struct EventBusJobPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    timeout: Duration,
}

impl EventBusJobPublisher {
    /// Publish to `topic` on `bus`, giving up on acknowledgements slower than `timeout`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            topic: topic.into(),
            timeout,
        }
    }
}

impl JobEventPublisher for EventBusJobPublisher {
    fn publish<'a>(
        &'a self,
        event: &'a RecordedJobEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let serialized = event
                .to_serialized()
                .map_err(|e| PublishError::Encoding(e.to_string()))?;

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, self.bus.publish(&self.topic, &serialized)).await;
            metrics::histogram!("job_publish_duration_seconds").record(started.elapsed().as_secs_f64());

            match outcome {
                Ok(Ok(())) => {
                    metrics::counter!("job_events_published_total", "type" => serialized.event_type.clone())
                        .increment(1);
                    tracing::debug!(
                        topic = %self.topic,
                        key = %serialized.key,
                        event_type = %serialized.event_type,
                        "Job event published"
                    );
                    Ok(())
                },
                Ok(Err(e)) => {
                    metrics::counter!("job_publish_failures_total", "reason" => "rejected").increment(1);
                    tracing::error!(topic = %self.topic, key = %serialized.key, error = %e, "Job event publish failed");
                    Err(PublishError::Rejected(e.to_string()))
                },
                Err(_) => {
                    metrics::counter!("job_publish_failures_total", "reason" => "timeout").increment(1);
                    tracing::error!(
                        topic = %self.topic,
                        key = %serialized.key,
                        timeout = ?self.timeout,
                        "Job event publish not acknowledged; outcome unknown"
                    );
                    Err(PublishError::Timeout(self.timeout))
                },
            }
        })
    }
}
