//! Domain types for job postings.
//!
//! Value objects ([`JobId`], [`VendorId`], [`Money`], [`PostingData`]), the
//! aggregate ([`Job`]) and the command outcome ([`JobOperationResult`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a job posting.
///
/// Generated server-side when the posting is created; never changes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the vendor that owns a posting.
///
/// Supplied by the caller; the only authorization input the service knows.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VendorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VendorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// Payment amount in cents. Non-negative by construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// The mutable content of a posting, as supplied by the vendor.
///
/// Format checks (non-blank text, coordinate ranges) happen before a command
/// reaches the service; the core trusts this value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingData {
    /// Short title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Latitude in degrees, -90..=90
    pub latitude: f64,
    /// Longitude in degrees, -180..=180
    pub longitude: f64,
    /// Offered payment
    pub payment: Money,
}

// ============================================================================
// Aggregate
// ============================================================================

/// Current state of one posting, derived from its event history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Posting id (the log key)
    pub id: JobId,
    /// Owner; fixed at creation
    pub vendor_id: VendorId,
    /// Emission time of the `Posted` event
    pub created_at: DateTime<Utc>,
    /// Emission time of the latest `Updated` event, if any
    pub modified_at: Option<DateTime<Utc>>,
    /// Short title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Offered payment
    pub payment: Money,
}

impl Job {
    /// A freshly posted job: `created_at = at`, no `modified_at`.
    #[must_use]
    pub fn posted(id: JobId, vendor_id: VendorId, data: PostingData, at: DateTime<Utc>) -> Self {
        let PostingData {
            title,
            description,
            latitude,
            longitude,
            payment,
        } = data;
        Self {
            id,
            vendor_id,
            created_at: at,
            modified_at: None,
            title,
            description,
            latitude,
            longitude,
            payment,
        }
    }

    /// This job with every mutable field replaced by `data`.
    ///
    /// Identity, owner and creation time are carried over; `modified_at`
    /// becomes `at`.
    #[must_use]
    pub fn revised(&self, data: PostingData, at: DateTime<Utc>) -> Self {
        let PostingData {
            title,
            description,
            latitude,
            longitude,
            payment,
        } = data;
        Self {
            id: self.id.clone(),
            vendor_id: self.vendor_id.clone(),
            created_at: self.created_at,
            modified_at: Some(at),
            title,
            description,
            latitude,
            longitude,
            payment,
        }
    }

    /// The mutable content of this job.
    #[must_use]
    pub fn data(&self) -> PostingData {
        PostingData {
            title: self.title.clone(),
            description: self.description.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            payment: self.payment,
        }
    }

    /// Whether `vendor` owns this posting.
    #[must_use]
    pub fn is_owned_by(&self, vendor: &VendorId) -> bool {
        &self.vendor_id == vendor
    }
}

// ============================================================================
// Command outcome
// ============================================================================

/// Outcome of a validated update or delete.
///
/// `NotFound` and `Forbidden` are expected business outcomes, not errors:
/// nothing was published for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub enum JobOperationResult {
    /// Validation passed and exactly one event was published.
    Success,
    /// No posting exists for the id (never posted, or deleted).
    NotFound,
    /// The posting belongs to a different vendor.
    Forbidden,
}

impl fmt::Display for JobOperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NotFound => write!(f, "not found"),
            Self::Forbidden => write!(f, "forbidden"),
        }
    }
}
