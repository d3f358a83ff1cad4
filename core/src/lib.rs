//! # Job Postings Core
//!
//! Collaborator abstractions for the event-sourced job postings service.
//!
//! Every change to a posting is recorded as an immutable event appended to a
//! per-key ordered log; the current state of a posting is a materialized view
//! rebuilt by folding that history. This crate defines the seams the domain
//! crate is written against:
//!
//! - **Event**: [`event::SerializedEvent`] envelope carrying the ordering key and
//!   the emission timestamp
//! - **Event log**: [`event_bus::EventBus`] append/subscribe with per-key order
//! - **Materialized view**: [`projection::ProjectionStore`] point lookups and
//!   [`projection::ProjectionCheckpoint`] cursor persistence
//! - **Environment**: injected [`environment::Clock`] and
//!   [`environment::IdGenerator`]
//!
//! ## Architecture
//!
//! ```text
//! Command path                      Aggregation path
//! ┌──────────────┐                  ┌──────────────────┐
//! │ JobService   │── publish ──►    │  Event log       │
//! │ (validate)   │                  │  (per-key order) │
//! └──────┬───────┘                  └────────┬─────────┘
//!        │ find_by_id                        │ subscribe
//!        ▼                                   ▼
//! ┌──────────────┐   written only by  ┌──────────────────┐
//! │ View (read)  │◄───────────────────│  fold worker     │
//! └──────────────┘                    └──────────────────┘
//! ```
//!
//! Implementations live in `job-postings-redpanda` (event log),
//! `job-postings-projections` (PostgreSQL view) and `job-postings-testing`
//! (in-memory doubles).

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod event;
pub mod event_bus;
pub mod projection;
