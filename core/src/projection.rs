//! Materialized view storage and cursor checkpoints.
//!
//! # Overview
//!
//! The materialized view is a key-value snapshot store holding the current
//! aggregate per key. It has exactly one writer, the aggregation worker, and
//! any number of readers doing point lookups.
//!
//! ## Key Concepts
//!
//! - **Projection Store**: Backend storage for the view (Postgres, in-memory)
//! - **Checkpoint**: The worker's cursor into the log. The subscription
//!   resumes from it, so it only moves after the view write succeeded
//! - **Rebuild**: Clear the view, reset the checkpoint, replay the log
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │         Event log (Redpanda)         │
//! └──────────────────┬───────────────────┘
//!                    │ ordered per key
//!                    ▼
//!          ┌───────────────────┐     ┌──────────────┐
//!          │ Aggregation worker│────►│  Checkpoint  │
//!          └─────────┬─────────┘     └──────────────┘
//!                    │ save / delete
//!                    ▼
//!          ┌───────────────────┐
//!          │ Projection store  │◄──── get (query side)
//!          └───────────────────┘
//! ```

use crate::event_bus::LogOffset;
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Event processing error
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Storage backend for materialized view data.
///
/// Values are opaque bytes; the domain crate decides the encoding.
///
/// # Example
///
/// ```ignore
/// let store = PostgresProjectionStore::new(pool, "job_aggregates".to_string());
/// store.save("job-123", &bytes).await?;
/// let data = store.get("job-123").await?;
/// ```
pub trait ProjectionStore: Send + Sync {
    /// Save data under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if save fails.
    fn save(&self, key: &str, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Get data by key.
    ///
    /// `Ok(None)` means the key is absent. An unreachable backend is an `Err`,
    /// never `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if retrieval fails.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Delete data by key. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if deletion fails.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry. Used when rebuilding the view from the log.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the store cannot be cleared.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Checkpoint tracking for the aggregation worker's progress through the log.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns so it can be shared
/// as `Arc<dyn ProjectionCheckpoint>`.
pub trait ProjectionCheckpoint: Send + Sync {
    /// Save the current position in the event stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if save fails.
    fn save_position(
        &self,
        projection_name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Load the last saved position for a projection.
    ///
    /// `None` means the projection has never run or was reset; both start
    /// from the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if load fails.
    fn load_position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>>;
}

/// How far a worker has folded through the log: the next offset to read on
/// every topic partition it has seen.
///
/// A partition with no entry is read from its first retained record, so
/// [`EventPosition::beginning`] replays the whole log.
///
/// # Example
///
/// ```
/// use job_postings_core::event_bus::LogOffset;
/// use job_postings_core::projection::EventPosition;
/// use chrono::Utc;
///
/// let mut position = EventPosition::beginning();
/// assert_eq!(position.next_offset("job-events", 0), None);
///
/// position.advance(&LogOffset::new("job-events", 0, 41), Utc::now());
/// assert_eq!(position.next_offset("job-events", 0), Some(42));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPosition {
    next: BTreeMap<String, BTreeMap<i32, i64>>,

    /// Emission time of the last folded event
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventPosition {
    /// Nothing folded yet; every partition is read from the start.
    #[must_use]
    pub fn beginning() -> Self {
        Self::default()
    }

    /// Set the next offset to read on one partition.
    #[must_use]
    pub fn with_next_offset(mut self, topic: impl Into<String>, partition: i32, next: i64) -> Self {
        self.next.entry(topic.into()).or_default().insert(partition, next);
        self
    }

    /// Record that `record` was folded. The cursor never moves backwards.
    pub fn advance(&mut self, record: &LogOffset, timestamp: DateTime<Utc>) {
        let next = self
            .next
            .entry(record.topic.clone())
            .or_default()
            .entry(record.partition)
            .or_insert(0);
        *next = (*next).max(record.offset + 1);
        self.timestamp = Some(timestamp);
    }

    /// Next offset to read on `partition` of `topic`, if any was recorded.
    #[must_use]
    pub fn next_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.next.get(topic)?.get(&partition).copied()
    }

    /// Every recorded `(topic, partition, next offset)`.
    pub fn offsets(&self) -> impl Iterator<Item = (&str, i32, i64)> + '_ {
        self.next.iter().flat_map(|(topic, partitions)| {
            partitions
                .iter()
                .map(move |(partition, next)| (topic.as_str(), *partition, *next))
        })
    }

    /// Whether no partition has been read yet.
    #[must_use]
    pub fn is_beginning(&self) -> bool {
        self.next.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_one_partition_past_the_record() {
        let mut position = EventPosition::beginning();
        position.advance(&LogOffset::new("jobs", 1, 9), Utc::now());

        assert_eq!(position.next_offset("jobs", 1), Some(10));
        assert_eq!(position.next_offset("jobs", 0), None);
        assert_eq!(position.next_offset("other", 1), None);
        assert!(!position.is_beginning());
    }

    #[test]
    fn redelivered_record_does_not_rewind() {
        let mut position = EventPosition::beginning().with_next_offset("jobs", 0, 5);
        position.advance(&LogOffset::new("jobs", 0, 2), Utc::now());

        assert_eq!(position.next_offset("jobs", 0), Some(5));
    }

    #[test]
    fn offsets_lists_every_partition() {
        let position = EventPosition::beginning()
            .with_next_offset("b", 0, 3)
            .with_next_offset("a", 1, 7)
            .with_next_offset("a", 0, 2);

        let offsets: Vec<_> = position.offsets().collect();
        assert_eq!(offsets, vec![("a", 0, 2), ("a", 1, 7), ("b", 0, 3)]);
    }
}
