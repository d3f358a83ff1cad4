//! Event trait and the serialized envelope that travels through the event log.
//!
//! Events represent facts about things that have happened in the past and are
//! immutable. Each one is keyed by the aggregate it belongs to; the log keeps
//! events of one key in publish order, and that order is all the aggregation
//! side relies on.
//!
//! # Envelope
//!
//! [`SerializedEvent`] is what the event log stores and delivers:
//!
//! - `event_type`: stable, versioned name (`"JobPosted.v1"`)
//! - `key`: the ordering/partition key (the aggregate id)
//! - `timestamp`: emission time recorded when the event was built
//! - `data`: the encoded domain event
//!
//! The timestamp is part of the event, not read from a clock on the consuming
//! side, so folding the same log twice yields the same result.
//!
//! The envelope itself is never encoded as a unit. A log maps its fields onto
//! native record fields (Kafka: record key, record timestamp, an `event_type`
//! header, and `data` as the value), so only `data` has a schema to evolve.
//!
//! # Example
//!
//! ```
//! use job_postings_core::event::{Event, SerializedEvent};
//! use chrono::Utc;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum CounterEvent {
//!     Incremented { by: u32 },
//! }
//!
//! impl Event for CounterEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             CounterEvent::Incremented { .. } => "Incremented.v1",
//!         }
//!     }
//! }
//!
//! let event = CounterEvent::Incremented { by: 2 };
//! let serialized = SerializedEvent::from_event("counter-1", Utc::now(), &event).unwrap();
//! assert_eq!(serialized.event_type, "Incremented.v1");
//! assert_eq!(serialized.key, "counter-1");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be appended to the event log and replayed to rebuild state.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier that includes a version number,
/// e.g. `"JobPosted.v1"`. Old events stay authoritative forever, so a name is
/// never reused for an incompatible shape.
///
/// # Serialization
///
/// The default `to_bytes`/`from_bytes` use `bincode`. Event types whose wire
/// schema must evolve (new optional fields) override both with a
/// self-describing format.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted or
    /// belong to an incompatible schema.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event as stored in, and delivered by, the event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "JobPosted.v1").
    pub event_type: String,

    /// Ordering key. All events sharing a key are delivered in publish order.
    pub key: String,

    /// Emission time recorded by the producer.
    pub timestamp: DateTime<Utc>,

    /// The encoded event data.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        key: String,
        timestamp: DateTime<Utc>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            event_type,
            key,
            timestamp,
            data,
        }
    }

    /// Create a serialized event from an [`Event`] value.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        key: impl Into<String>,
        timestamp: DateTime<Utc>,
        event: &E,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            key: key.into(),
            timestamp,
            data: event.to_bytes()?,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.key,
            self.data.len()
        )
    }
}
