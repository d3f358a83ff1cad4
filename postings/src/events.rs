//! Job posting events and their wire encoding.
//!
//! Events are the durable system of record: once appended they stay
//! authoritative forever, so the JSON shape may only grow. New fields must be
//! optional (`#[serde(default)]`); existing fields are never removed or retyped.
//!
//! ```json
//! {"type":"posted","id":"…","vendorId":"v1","title":"Tutoring","description":"Math help",
//!  "latitude":51.5,"longitude":-1.1,"payment":799}
//! {"type":"updated","title":"Math Tutoring", …}
//! {"type":"deleted"}
//! ```
//!
//! A `"type"` this build does not know decodes to [`JobEvent::Unknown`], which
//! the fold ignores.

use crate::types::{Job, JobId, PostingData, VendorId};
use chrono::{DateTime, Utc};
use job_postings_core::event::{Event, EventError, SerializedEvent};
use serde::{Deserialize, Serialize};

/// A change to one job posting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    /// A vendor created the posting.
    Posted {
        /// Posting id (equal to the log key)
        id: JobId,
        /// Owner
        vendor_id: VendorId,
        /// Initial content
        #[serde(flatten)]
        data: PostingData,
    },
    /// The owner replaced the posting's content.
    Updated {
        /// Full replacement of the mutable fields
        #[serde(flatten)]
        data: PostingData,
    },
    /// The owner removed the posting.
    Deleted,
    /// An event kind introduced after this build.
    #[serde(other)]
    Unknown,
}

impl Event for JobEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Posted { .. } => "JobPosted.v1",
            Self::Updated { .. } => "JobUpdated.v1",
            Self::Deleted => "JobDeleted.v1",
            Self::Unknown => "JobUnknown",
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An event as delivered by the log: key, emission time, payload.
///
/// The timestamp is stamped by the command service when the event is built
/// and is the only time the fold ever looks at.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedJobEvent {
    /// Posting the event belongs to
    pub key: JobId,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// The change itself
    pub event: JobEvent,
}

impl RecordedJobEvent {
    /// Bundle an event with its key and emission time.
    #[must_use]
    pub const fn new(key: JobId, timestamp: DateTime<Utc>, event: JobEvent) -> Self {
        Self {
            key,
            timestamp,
            event,
        }
    }

    /// Decode an envelope delivered by the event log.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the payload is not JSON
    /// or a known variant is missing a required field. Unknown variants decode
    /// fine.
    pub fn from_serialized(serialized: &SerializedEvent) -> Result<Self, EventError> {
        Ok(Self {
            key: JobId::new(serialized.key.clone()),
            timestamp: serialized.timestamp,
            event: JobEvent::from_bytes(&serialized.data)?,
        })
    }

    /// Encode for the event log.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        SerializedEvent::from_event(self.key.as_str(), self.timestamp, &self.event)
    }
}

/// Changelog entry republished by the aggregation worker after each fold.
///
/// Carries the full aggregate (with `createdAt`/`modifiedAt`) so downstream
/// consumers can track current state without refolding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobAggregateEvent {
    /// The posting's current state.
    Aggregated {
        /// Folded aggregate
        #[serde(flatten)]
        job: Job,
    },
    /// The posting no longer exists.
    Tombstoned {
        /// Deleted posting
        id: JobId,
    },
}

impl Event for JobAggregateEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Aggregated { .. } => "JobAggregated.v1",
            Self::Tombstoned { .. } => "JobTombstoned.v1",
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}
