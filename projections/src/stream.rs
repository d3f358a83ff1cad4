//! Checkpointed event stream for the materialized view.
//!
//! Provides `ProjectionStream`, a type-agnostic helper for consuming events
//! from an event bus with checkpoint tracking. The caller handles decoding
//! since only it knows the concrete event types.
//!
//! # Layering
//!
//! - **Transport layer** (this module): subscription, position tracking, checkpoints
//! - **Business logic** (caller): decoding and folding into the view
//!
//! The transport layer works with `SerializedEvent` (raw bytes), while the
//! caller decodes to its specific event types.
//!
//! # Example
//!
//! ```ignore
//! use job_postings_projections::ProjectionStream;
//!
//! let mut stream = ProjectionStream::new(
//!     event_bus,
//!     checkpoint,
//!     "job-events",
//!     "job-aggregator",
//!     "job-aggregates",
//! ).await?;
//!
//! while let Some(result) = stream.next().await {
//!     let serialized = result?;
//!     let recorded = RecordedJobEvent::from_serialized(&serialized)?;
//!     view.apply(&recorded).await?;
//!
//!     // Only after the view write succeeded
//!     stream.commit().await?;
//! }
//! stream.flush().await?;
//! ```

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use job_postings_core::event::SerializedEvent;
use job_postings_core::event_bus::{EventBus, EventBusError, EventStream, LogOffset};
use job_postings_core::projection::{EventPosition, ProjectionCheckpoint, ProjectionError};
use std::sync::Arc;

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Default number of commits between checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// Manages event stream consumption with checkpoint tracking.
///
/// ```text
/// ┌─────────────┐
/// │  Event Bus  │ (Redpanda/Kafka)
/// └──────┬──────┘
///        │ Delivery (event + log offset)
///        ▼
/// ┌─────────────────┐
/// │ProjectionStream │ (this module)
/// └────┬────────────┘
///      │ SerializedEvent (raw bytes)
///      ▼
/// ┌─────────────────┐
/// │ Aggregation     │ decodes, folds, writes the view,
/// │ worker          │ then calls stream.commit()
/// └─────────────────┘
/// ```
///
/// # Cursor
///
/// The saved [`EventPosition`] is the only cursor: the subscription starts
/// from it, and it advances past a record only when [`ProjectionStream::commit`]
/// is called for it. Whatever was handed out but not committed, or committed
/// but not yet saved, is delivered again after a restart.
///
/// The checkpoint timestamp is the timestamp of the last committed event, not
/// the wall clock, so replaying the same log yields the same checkpoints.
pub struct ProjectionStream {
    /// Event bus subscription stream
    event_stream: EventStream,
    /// Checkpoint tracker
    checkpoint: Arc<dyn ProjectionCheckpoint>,
    /// Projection name (for checkpoint key)
    projection_name: String,
    /// Committed position, including what was folded before a restart
    position: EventPosition,
    /// Record handed out by `next()` and not yet committed
    in_flight: Option<(LogOffset, DateTime<Utc>)>,
    /// Checkpoint save interval (save every N events)
    checkpoint_interval: u64,
    /// Events committed since last checkpoint
    events_since_checkpoint: u64,
}

impl ProjectionStream {
    /// Create a new projection stream resuming from the saved checkpoint.
    ///
    /// # Arguments
    ///
    /// - `event_bus`: Event bus to subscribe to
    /// - `checkpoint`: Checkpoint tracker for resumption
    /// - `topic`: Topic name to subscribe to
    /// - `consumer_group`: Consumer identity on the broker (logged)
    /// - `projection_name`: Name for checkpoint storage
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Cannot load checkpoint from storage
    /// - Cannot subscribe to event bus
    pub async fn new(
        event_bus: Arc<dyn EventBus>,
        checkpoint: Arc<dyn ProjectionCheckpoint>,
        topic: impl Into<String>,
        consumer_group: impl Into<String>,
        projection_name: impl Into<String>,
    ) -> Result<Self> {
        let topic = topic.into();
        let consumer_group = consumer_group.into();
        let projection_name = projection_name.into();

        let position = match checkpoint.load_position(&projection_name).await? {
            Some(position) => {
                tracing::info!(
                    projection = %projection_name,
                    offsets = ?position.offsets().collect::<Vec<_>>(),
                    timestamp = ?position.timestamp,
                    "Resuming from checkpoint"
                );
                position
            },
            None => {
                tracing::info!(projection = %projection_name, "Starting from beginning");
                EventPosition::beginning()
            },
        };

        let event_stream = event_bus
            .subscribe(&[topic.as_str()], &position)
            .await
            .map_err(|e| match e {
                EventBusError::SubscriptionFailed { topics, reason } => {
                    ProjectionError::EventProcessing(format!(
                        "Failed to subscribe to {topics:?}: {reason}"
                    ))
                }
                _ => ProjectionError::EventProcessing(format!("Subscription error: {e}")),
            })?;

        tracing::info!(
            projection = %projection_name,
            topic = %topic,
            consumer_group = %consumer_group,
            "Projection stream initialized"
        );

        Ok(Self {
            event_stream,
            checkpoint,
            projection_name,
            position,
            in_flight: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            events_since_checkpoint: 0,
        })
    }

    /// Set the checkpoint save interval (every N commits, minimum 1).
    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` if the subscription ended. Returns `Err` on a
    /// transport-level error (disconnection, malformed record).
    pub async fn next(&mut self) -> Option<std::result::Result<SerializedEvent, EventBusError>> {
        match self.event_stream.next().await? {
            Ok(delivery) => {
                self.in_flight = Some((delivery.offset, delivery.event.timestamp));
                Some(Ok(delivery.event))
            },
            Err(e) => Some(Err(e)),
        }
    }

    /// Record that the last event returned by [`ProjectionStream::next`] was
    /// fully applied, moving the cursor past it.
    ///
    /// Checkpoints are saved every `checkpoint_interval` commits, not on
    /// every call.
    ///
    /// # Errors
    ///
    /// Returns error if checkpoint save fails.
    pub async fn commit(&mut self) -> Result<()> {
        let Some((offset, timestamp)) = self.in_flight.take() else {
            return Ok(());
        };
        self.position.advance(&offset, timestamp);
        self.events_since_checkpoint += 1;

        if self.events_since_checkpoint >= self.checkpoint_interval {
            self.save_checkpoint().await?;
        }

        Ok(())
    }

    /// Save the current position now, regardless of the interval.
    ///
    /// Call on shutdown so a restart does not refold the tail.
    ///
    /// # Errors
    ///
    /// Returns error if checkpoint save fails.
    pub async fn flush(&mut self) -> Result<()> {
        if self.events_since_checkpoint == 0 {
            return Ok(());
        }
        self.save_checkpoint().await
    }

    async fn save_checkpoint(&mut self) -> Result<()> {
        self.checkpoint
            .save_position(&self.projection_name, self.position.clone())
            .await?;

        tracing::debug!(
            projection = %self.projection_name,
            offsets = ?self.position.offsets().collect::<Vec<_>>(),
            "Checkpoint saved"
        );

        self.events_since_checkpoint = 0;
        Ok(())
    }

    /// Committed position, including what was folded before a restart.
    #[must_use]
    pub const fn position(&self) -> &EventPosition {
        &self.position
    }
}
