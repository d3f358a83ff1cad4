//! Query side: point lookups of current job aggregates.

use crate::types::{Job, JobId};
use crate::view::JobViewReader;
use job_postings_core::projection::ProjectionStore;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// The view could not answer. Never used to signal "no such job".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The view store failed or returned undecodable data.
    #[error("Job view unavailable: {0}")]
    Unavailable(String),

    /// The lookup did not complete in time.
    #[error("Job lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Looks up current job aggregates.
///
/// Dyn-compatible so the command service can hold an `Arc<dyn JobQueryService>`.
pub trait JobQueryService: Send + Sync {
    /// `Ok(None)` if no job exists for `id` (never posted, or deleted).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the view cannot be consulted.
    fn find_by_id<'a>(
        &'a self,
        id: &'a JobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Job>, QueryError>> + Send + 'a>>;
}

/// [`JobQueryService`] backed by the materialized view.
pub struct ViewJobQueryService<S> {
    reader: JobViewReader<S>,
    timeout: Duration,
}

impl<S: ProjectionStore> ViewJobQueryService<S> {
    /// Look up jobs through `reader`, failing any lookup slower than `timeout`.
    #[must_use]
    pub const fn new(reader: JobViewReader<S>, timeout: Duration) -> Self {
        Self { reader, timeout }
    }
}

impl<S: ProjectionStore + 'static> JobQueryService for ViewJobQueryService<S> {
    fn find_by_id<'a>(
        &'a self,
        id: &'a JobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Job>, QueryError>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.reader.get(id)).await {
                Ok(Ok(job)) => Ok(job),
                Ok(Err(e)) => {
                    tracing::error!(job_id = %id, error = %e, "Job view lookup failed");
                    Err(QueryError::Unavailable(e.to_string()))
                },
                Err(_) => {
                    tracing::error!(job_id = %id, timeout = ?self.timeout, "Job view lookup timed out");
                    Err(QueryError::Timeout(self.timeout))
                },
            }
        })
    }
}
