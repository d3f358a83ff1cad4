//! Materialized view plumbing for the job postings service.
//!
//! # Overview
//!
//! - **`ProjectionStream`**: checkpointed cursor over the event log
//! - **`PostgreSQL`**: persistent view store and checkpoint tracking
//!
//! The aggregation worker reads raw envelopes from a [`ProjectionStream`],
//! folds them, writes the result to a `ProjectionStore` and only then calls
//! [`ProjectionStream::commit`].
//!
//! ```text
//! Event log  →  ProjectionStream  →  fold  →  PostgresProjectionStore
//!                      │
//!                      └──► PostgresProjectionCheckpoint
//! ```

pub mod postgres;
pub mod stream;

pub use postgres::{PostgresProjectionCheckpoint, PostgresProjectionStore};
pub use stream::ProjectionStream;
