//! # Job Postings
//!
//! Event-sourced job postings. Vendors post, update and delete jobs; every
//! change is appended as an event to a per-key ordered log, and the current
//! state of each job is a materialized view built by folding that log.
//!
//! ## Flow
//!
//! ```text
//!  add / update / delete
//!          │
//!          ▼
//!  ┌──────────────┐  find_by_id   ┌───────────────────┐
//!  │  JobService  │──────────────►│ ViewJobQueryService│
//!  └──────┬───────┘               └─────────┬─────────┘
//!         │ publish                         │ JobViewReader
//!         ▼                                 ▼
//!  ┌──────────────┐   subscribe   ┌──────────────────────┐   put/remove   ┌─────────┐
//!  │  job-events  │──────────────►│ JobAggregationWorker │───────────────►│ JobView │
//!  └──────────────┘               └──────────────────────┘                └─────────┘
//! ```
//!
//! The command service never writes the view. A read issued right after a
//! successful command may still return the previous state until the worker
//! has folded the new event.
//!
//! ## Modules
//!
//! - [`types`]: ids, money, posting content, the `Job` aggregate
//! - [`events`]: `JobEvent` and its JSON wire form
//! - [`aggregator`]: the pure fold
//! - [`view`]: single-writer materialized view handles
//! - [`query`], [`publisher`], [`service`]: the command and query side
//! - [`materializer`]: the aggregation worker
//! - [`config`], [`metrics`]: process wiring

pub mod aggregator;
pub mod config;
pub mod events;
pub mod materializer;
pub mod metrics;
pub mod publisher;
pub mod query;
pub mod service;
pub mod types;
pub mod view;

pub use aggregator::{fold, replay};
pub use config::Config;
pub use events::{JobAggregateEvent, JobEvent, RecordedJobEvent};
pub use materializer::{Applied, JobAggregationWorker, WorkerError, WorkerSettings};
pub use publisher::{EventBusJobPublisher, JobEventPublisher, PublishError};
pub use query::{JobQueryService, QueryError, ViewJobQueryService};
pub use service::{JobService, JobServiceError};
pub use types::{Job, JobId, JobOperationResult, Money, PostingData, VendorId};
pub use view::{JobView, JobViewReader};
