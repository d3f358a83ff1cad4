//! Event log abstraction: keyed, ordered append and subscribe.
//!
//! The [`EventBus`] trait is the only way events enter or leave the log. The
//! command side appends; the aggregation side subscribes and folds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Command   │
//! └──────┬──────┘
//!        │ validate against view
//!        ▼
//! ┌─────────────────┐
//! │ publish(key, e) │◄─── ack or error, never silently dropped
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Topic / log    │◄─── one partition per key, publish order kept
//! └────────┬────────┘
//!          │ subscribe
//!          ▼
//! ┌─────────────────┐
//! │ Aggregation     │
//! │ worker (fold)   │
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Keyed partitioning**: [`SerializedEvent::key`] selects the partition, so
//!   every event of one aggregate is delivered in the order it was published
//! - **No cross-key order**: aggregates are independent
//! - **Surface failures**: a publish that is not acknowledged returns an error;
//!   implementations do not retry on the caller's behalf
//! - **At-least-once delivery** on the subscribe side: a subscriber resumes
//!   from the [`EventPosition`] it saved, so anything handled after its last
//!   save is delivered again
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `job-postings-testing` - retaining in-process log
//! - `RedpandaEventBus` in `job-postings-redpanda` - Kafka-compatible brokers

use crate::event::SerializedEvent;
use crate::projection::EventPosition;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Address of one record in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogOffset {
    /// Topic the record was appended to
    pub topic: String,
    /// Partition within the topic
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

impl LogOffset {
    /// Address `offset` on `partition` of `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// An event handed to a subscriber, with the record it was read from.
///
/// The subscriber advances its [`EventPosition`] with `offset` once the event
/// has been fully handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The event
    pub event: SerializedEvent,
    /// Where it sits in the log
    pub offset: LogOffset,
}

/// Stream of deliveries from subscriptions.
///
/// Each item is either a delivery or a transport error; the stream keeps
/// going after errors.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event log implementations.
///
/// # Ordering
///
/// Two publishes for the same key, issued one after the other by the same
/// caller (the second started after the first returned `Ok`), are delivered to
/// every subscriber in that order.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single bus is shared by all
/// concurrent command invocations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` so it can be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Append an event to a topic, partitioned by `event.key`.
    ///
    /// Resolves once the log has acknowledged the append.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the log rejected the event or
    /// did not acknowledge it in time.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics, starting at `from`.
    ///
    /// Each partition recorded in `from` is read from its next offset; every
    /// other partition is read from its first retained record. Implementations
    /// keep no cursor of their own, so the caller's saved position is the only
    /// thing that decides where a restarted subscription resumes.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
        from: &EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
