//! Command service: add, update and delete job postings.
//!
//! Every command follows the same shape. Read current state from the view,
//! check existence and ownership, then publish exactly one event, or none.
//! The service never writes the view; the aggregation worker will fold the
//! published event later, so a read right after a command may still see the
//! old state.
//!
//! ```text
//! update(id, vendor, data)
//!   │
//!   ├─ find_by_id(id) ── absent ──────────────► NotFound   (no event)
//!   │        │
//!   │        └─ vendor mismatch ──────────────► Forbidden  (no event)
//!   │
//!   └─ publish(Updated) ── ack ───────────────► Success
//!                      └─ error / timeout ───► Err(JobServiceError)
//! ```

use crate::config::Config;
use crate::events::{JobEvent, RecordedJobEvent};
use crate::publisher::{EventBusJobPublisher, JobEventPublisher, PublishError};
use crate::query::{JobQueryService, QueryError, ViewJobQueryService};
use crate::types::{Job, JobId, JobOperationResult, PostingData, VendorId};
use crate::view::JobViewReader;
use job_postings_core::environment::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use job_postings_core::event_bus::EventBus;
use job_postings_core::projection::ProjectionStore;
use std::sync::Arc;
use thiserror::Error;

/// A collaborator (view or event log) failed; the command did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobServiceError {
    /// Current state could not be read. Nothing was published.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The event was not confirmed appended.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl JobServiceError {
    /// Whether the command's event may have been appended anyway.
    ///
    /// Callers must not treat such a command as failed-and-safe-to-retry.
    #[must_use]
    pub const fn is_indeterminate(&self) -> bool {
        match self {
            Self::Query(_) => false,
            Self::Publish(e) => e.is_indeterminate(),
        }
    }
}

/// Validates commands against the view and publishes the resulting events.
#[derive(Clone)]
pub struct JobService {
    publisher: Arc<dyn JobEventPublisher>,
    query: Arc<dyn JobQueryService>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

/// What the ownership gate decided.
enum Gate {
    Allowed,
    Refused(JobOperationResult),
}

impl JobService {
    /// Create a service over its collaborators.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn JobEventPublisher>,
        query: Arc<dyn JobQueryService>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            publisher,
            query,
            clock,
            ids,
        }
    }

    /// Production wiring: publish to the configured job topic on `bus` and
    /// look jobs up through `reader`, each bounded by its configured deadline.
    #[must_use]
    pub fn from_config<S: ProjectionStore + 'static>(
        bus: Arc<dyn EventBus>,
        reader: JobViewReader<S>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(EventBusJobPublisher::new(
                bus,
                config.redpanda.job_topic.clone(),
                config.timeouts.publish(),
            )),
            Arc::new(ViewJobQueryService::new(reader, config.timeouts.lookup())),
            Arc::new(SystemClock),
            Arc::new(UuidIdGenerator),
        )
    }

    /// Post a new job for `vendor_id`.
    ///
    /// Returns the aggregate built locally from the inputs; the view is not
    /// re-read since the worker has not folded the event yet.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Publish`] if the event was not acknowledged.
    #[tracing::instrument(skip(self, data), fields(job_id = tracing::field::Empty), name = "job_add")]
    pub async fn add(&self, vendor_id: VendorId, data: PostingData) -> Result<Job, JobServiceError> {
        let id = JobId::new(self.ids.next_id());
        tracing::Span::current().record("job_id", tracing::field::display(&id));
        let now = self.clock.now();

        let event = RecordedJobEvent::new(
            id.clone(),
            now,
            JobEvent::Posted {
                id: id.clone(),
                vendor_id: vendor_id.clone(),
                data: data.clone(),
            },
        );
        self.publish(&event).await?;

        metrics::counter!("job_commands_total", "command" => "add", "outcome" => "success").increment(1);
        tracing::info!("Job posted");
        Ok(Job::posted(id, vendor_id, data, now))
    }

    /// Replace the content of job `id`, if it exists and `vendor_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError`] if the view could not be read or the event
    /// was not acknowledged. `NotFound`/`Forbidden` are `Ok` outcomes.
    #[tracing::instrument(skip(self, data), name = "job_update")]
    pub async fn update(
        &self,
        id: &JobId,
        vendor_id: &VendorId,
        data: PostingData,
    ) -> Result<JobOperationResult, JobServiceError> {
        if let Gate::Refused(outcome) = self.gate("update", id, vendor_id).await? {
            return Ok(outcome);
        }

        let event = RecordedJobEvent::new(id.clone(), self.clock.now(), JobEvent::Updated { data });
        self.publish(&event).await?;

        metrics::counter!("job_commands_total", "command" => "update", "outcome" => "success").increment(1);
        tracing::info!("Job updated");
        Ok(JobOperationResult::Success)
    }

    /// Delete job `id`, if it exists and `vendor_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError`] if the view could not be read or the event
    /// was not acknowledged.
    #[tracing::instrument(skip(self), name = "job_delete")]
    pub async fn delete(
        &self,
        id: &JobId,
        vendor_id: &VendorId,
    ) -> Result<JobOperationResult, JobServiceError> {
        if let Gate::Refused(outcome) = self.gate("delete", id, vendor_id).await? {
            return Ok(outcome);
        }

        let event = RecordedJobEvent::new(id.clone(), self.clock.now(), JobEvent::Deleted);
        self.publish(&event).await?;

        metrics::counter!("job_commands_total", "command" => "delete", "outcome" => "success").increment(1);
        tracing::info!("Job deleted");
        Ok(JobOperationResult::Success)
    }

    /// Current state of job `id` as seen by the view.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Query`] if the view could not be read.
    pub async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, JobServiceError> {
        Ok(self.query.find_by_id(id).await?)
    }

    async fn gate(
        &self,
        command: &'static str,
        id: &JobId,
        vendor_id: &VendorId,
    ) -> Result<Gate, JobServiceError> {
        let refused = match self.query.find_by_id(id).await? {
            None => JobOperationResult::NotFound,
            Some(job) if !job.is_owned_by(vendor_id) => {
                tracing::warn!(owner = %job.vendor_id, "Vendor does not own job");
                JobOperationResult::Forbidden
            },
            Some(_) => return Ok(Gate::Allowed),
        };

        let outcome = if refused == JobOperationResult::NotFound { "not_found" } else { "forbidden" };
        metrics::counter!("job_commands_total", "command" => command, "outcome" => outcome).increment(1);
        tracing::info!(%refused, "Job command refused");
        Ok(Gate::Refused(refused))
    }

    async fn publish(&self, event: &RecordedJobEvent) -> Result<(), JobServiceError> {
        self.publisher.publish(event).await.map_err(JobServiceError::from)
    }
}
