//! Aggregation worker: keeps the job view current by folding the event log.
//!
//! # Overview
//!
//! The worker is the view's only writer. It runs independently of the
//! command path:
//! - Subscribes to the job event topic through a checkpointed [`ProjectionStream`]
//! - Folds each event into the previous aggregate for its key
//! - Writes (or removes) the result, then commits the cursor
//! - Leaves the view alone when the fold did not change anything
//! - Optionally republishes each folded aggregate to a changelog topic
//!
//! ```text
//! ┌─────────────┐
//! │ job-events  │ (ordered per key)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌──────────────────────┐     ┌────────────┐
//! │ JobAggregationWorker │────►│ Checkpoint │
//! └──┬────────────────┬──┘     └────────────┘
//!    │ put / remove   │ JobAggregated / JobTombstoned
//!    ▼                ▼
//! ┌─────────┐   ┌────────────────┐
//! │ JobView │   │ job-aggregates │ (optional)
//! └─────────┘   └────────────────┘
//! ```
//!
//! # Failure handling
//!
//! - An event that cannot be decoded is logged and skipped.
//! - A view or changelog failure blocks the stream: the same event is applied
//!   again after a backoff until it succeeds or shutdown is requested. Later
//!   events for the key are never folded over a missing write. Re-applying an
//!   event is harmless because the fold only depends on the event and the
//!   stored aggregate.
//!
//! # Rebuild
//!
//! [`JobAggregationWorker::rebuild`] clears the view and resets the checkpoint.
//! The subscription starts wherever the checkpoint points, so the next
//! [`JobAggregationWorker::run`] reads the log from the start.

use crate::aggregator::fold;
use crate::events::{JobAggregateEvent, RecordedJobEvent};
use crate::types::{Job, JobId};
use crate::view::{JobView, JobViewReader};
use chrono::{DateTime, Utc};
use job_postings_core::event::{EventError, SerializedEvent};
use job_postings_core::event_bus::{EventBus, EventBusError};
use job_postings_core::projection::{
    EventPosition, ProjectionCheckpoint, ProjectionError, ProjectionStore,
};
use job_postings_projections::ProjectionStream;
use job_postings_projections::stream::DEFAULT_CHECKPOINT_INTERVAL;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors raised while folding events into the view.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The event payload is not a job event.
    #[error("Undecodable job event: {0}")]
    Decode(#[from] EventError),

    /// The view or checkpoint store failed.
    #[error(transparent)]
    View(#[from] ProjectionError),

    /// The aggregate changelog could not be published.
    #[error("Failed to publish aggregate changelog: {0}")]
    Changelog(EventBusError),
}

/// Effect of applying one event to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The key now holds this aggregate.
    Stored(Job),
    /// The key has no aggregate.
    Removed(JobId),
    /// The fold left the key as it was; nothing was written.
    Unchanged(JobId),
}

/// Static wiring for a worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Topic the job events are read from
    pub topic: String,
    /// Consumer group (logged; configured on the event bus)
    pub consumer_group: String,
    /// Checkpoint name
    pub projection_name: String,
    /// Commits between checkpoint saves
    pub checkpoint_interval: u64,
    /// Changelog topic for folded aggregates, if any
    pub aggregate_topic: Option<String>,
    /// Pause before re-applying an event whose write failed
    pub retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            topic: "job-events".to_string(),
            consumer_group: "job-aggregator".to_string(),
            projection_name: "job-aggregates".to_string(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            aggregate_topic: None,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Folds the job event log into the view. Sole owner of the [`JobView`].
pub struct JobAggregationWorker<S> {
    view: JobView<S>,
    event_bus: Arc<dyn EventBus>,
    checkpoint: Arc<dyn ProjectionCheckpoint>,
    settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
}

impl<S: ProjectionStore + 'static> JobAggregationWorker<S> {
    /// Create a worker and the sender that stops it (send `true` or drop it).
    #[must_use]
    pub fn new(
        view: JobView<S>,
        event_bus: Arc<dyn EventBus>,
        checkpoint: Arc<dyn ProjectionCheckpoint>,
        settings: WorkerSettings,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            view,
            event_bus,
            checkpoint,
            settings,
            shutdown: shutdown_rx,
        };
        (worker, shutdown_tx)
    }

    /// Read-only handle for query services.
    #[must_use]
    pub fn reader(&self) -> JobViewReader<S> {
        self.view.reader()
    }

    /// Consume the event log until shutdown or until the subscription ends.
    ///
    /// The cursor is committed only after an event's view write succeeded;
    /// pending commits are flushed to the checkpoint on exit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::View`] if the subscription or the checkpoint
    /// store fails.
    #[allow(clippy::cognitive_complexity)]
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        tracing::info!(
            topic = %self.settings.topic,
            consumer_group = %self.settings.consumer_group,
            aggregate_topic = ?self.settings.aggregate_topic,
            "Starting job aggregation worker"
        );

        let mut stream = ProjectionStream::new(
            Arc::clone(&self.event_bus),
            Arc::clone(&self.checkpoint),
            self.settings.topic.clone(),
            self.settings.consumer_group.clone(),
            self.settings.projection_name.clone(),
        )
        .await?
        .with_checkpoint_interval(self.settings.checkpoint_interval);

        while !*self.shutdown.borrow() {
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(serialized)) => {
                        if self.apply_until_done(&serialized).await {
                            stream.commit().await?;
                        } else {
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        metrics::counter!("job_aggregator_stream_errors_total").increment(1);
                        tracing::error!(error = %e, "Error receiving event from bus");
                    },
                    None => {
                        tracing::warn!("Event stream ended");
                        break;
                    },
                },

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        stream.flush().await?;
        tracing::info!(
            offsets = ?stream.position().offsets().collect::<Vec<_>>(),
            "Job aggregation worker stopped"
        );
        Ok(())
    }

    /// Apply `serialized`, retrying write failures. `false` means shutdown
    /// interrupted the retries and the event was not applied.
    async fn apply_until_done(&mut self, serialized: &SerializedEvent) -> bool {
        loop {
            match self.apply(serialized).await {
                Ok(_) => return true,
                Err(WorkerError::Decode(e)) => {
                    metrics::counter!("job_aggregator_events_total", "outcome" => "skipped").increment(1);
                    tracing::warn!(
                        key = %serialized.key,
                        event_type = %serialized.event_type,
                        error = %e,
                        "Skipping undecodable event"
                    );
                    return true;
                },
                Err(e) => {
                    metrics::counter!("job_aggregator_events_total", "outcome" => "failed").increment(1);
                    tracing::error!(
                        key = %serialized.key,
                        event_type = %serialized.event_type,
                        error = %e,
                        backoff = ?self.settings.retry_backoff,
                        "Failed to apply event, will retry"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(self.settings.retry_backoff) => {},
                        changed = self.shutdown.changed() => {
                            if changed.is_err() || *self.shutdown.borrow() {
                                return false;
                            }
                        }
                    }
                },
            }
        }
    }

    /// Fold one event into the view: load previous, fold, store or remove.
    ///
    /// Nothing is written, and no changelog record is published, when the
    /// fold returns the previous aggregate (an orphan update, an unknown
    /// event, a replayed event already reflected in the view).
    ///
    /// # Errors
    ///
    /// - [`WorkerError::Decode`] if the payload is not a job event
    /// - [`WorkerError::View`] if the view read or write fails
    /// - [`WorkerError::Changelog`] if the changelog publish fails
    pub async fn apply(&self, serialized: &SerializedEvent) -> Result<Applied, WorkerError> {
        let recorded = RecordedJobEvent::from_serialized(serialized)?;
        let key = recorded.key.clone();

        let previous = self.view.get(&key).await?;
        let next = fold(&key, previous.clone(), &recorded);
        if next == previous {
            metrics::counter!("job_aggregator_events_total", "outcome" => "unchanged").increment(1);
            tracing::debug!(key = %key, event_type = %serialized.event_type, "Event left the view unchanged");
            return Ok(Applied::Unchanged(key));
        }

        let applied = match next {
            Some(job) => {
                self.view.put(&job).await?;
                Applied::Stored(job)
            },
            None => {
                self.view.remove(&key).await?;
                Applied::Removed(key)
            },
        };

        self.publish_changelog(&applied, recorded.timestamp).await?;

        metrics::counter!("job_aggregator_events_total", "outcome" => "applied").increment(1);
        tracing::debug!(key = %recorded.key, event_type = %serialized.event_type, "Event folded");
        Ok(applied)
    }

    async fn publish_changelog(
        &self,
        applied: &Applied,
        timestamp: DateTime<Utc>,
    ) -> Result<(), WorkerError> {
        let Some(topic) = &self.settings.aggregate_topic else {
            return Ok(());
        };

        let (key, event) = match applied {
            Applied::Stored(job) => (job.id.clone(), JobAggregateEvent::Aggregated { job: job.clone() }),
            Applied::Removed(id) => (id.clone(), JobAggregateEvent::Tombstoned { id: id.clone() }),
            Applied::Unchanged(_) => return Ok(()),
        };
        let serialized = SerializedEvent::from_event(key.as_str(), timestamp, &event).map_err(|e| {
            WorkerError::Changelog(EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })
        })?;

        self.event_bus
            .publish(topic, &serialized)
            .await
            .map_err(WorkerError::Changelog)
    }

    /// Clear the view and reset the checkpoint to the beginning of the log.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::View`] if clearing or the checkpoint save fails.
    pub async fn rebuild(&self) -> Result<(), WorkerError> {
        tracing::info!(projection = %self.settings.projection_name, "Rebuilding job view");

        self.view.clear().await?;
        self.checkpoint
            .save_position(&self.settings.projection_name, EventPosition::beginning())
            .await?;

        tracing::info!(
            projection = %self.settings.projection_name,
            "Job view cleared; next run replays the log"
        );
        Ok(())
    }
}
