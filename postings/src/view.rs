//! Materialized view of current job aggregates.
//!
//! The view has exactly one writer: the aggregation worker, which owns the
//! only [`JobView`]. Everyone else gets a [`JobViewReader`], which can only
//! look things up. The type split is what keeps the fold the sole source of
//! state transitions.
//!
//! Aggregates are stored bincode-encoded under their [`JobId`].

use crate::types::{Job, JobId};
use job_postings_core::projection::{ProjectionError, ProjectionStore, Result};
use std::sync::Arc;

fn encode(job: &Job) -> Result<Vec<u8>> {
    bincode::serialize(job).map_err(|e| ProjectionError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Job> {
    bincode::deserialize(bytes).map_err(|e| ProjectionError::Serialization(e.to_string()))
}

/// Write handle for the view. Not `Clone`.
pub struct JobView<S> {
    store: Arc<S>,
}

impl<S: ProjectionStore> JobView<S> {
    /// Take the write role over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// A read-only handle onto the same store.
    #[must_use]
    pub fn reader(&self) -> JobViewReader<S> {
        JobViewReader {
            store: Arc::clone(&self.store),
        }
    }

    /// Current aggregate for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or holds undecodable data.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        get(self.store.as_ref(), id).await
    }

    /// Store `job` as the current aggregate for its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if encoding or the write fails.
    pub async fn put(&self, job: &Job) -> Result<()> {
        self.store.save(job.id.as_str(), &encode(job)?).await
    }

    /// Drop the aggregate for `id`. Absent ids are fine.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the delete fails.
    pub async fn remove(&self, id: &JobId) -> Result<()> {
        self.store.delete(id.as_str()).await
    }

    /// Remove every aggregate (rebuild only).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store cannot be cleared.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

/// Read-only handle for the view. Cheap to clone.
pub struct JobViewReader<S> {
    store: Arc<S>,
}

impl<S> Clone for JobViewReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ProjectionStore> JobViewReader<S> {
    /// Current aggregate for `id`; `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store is unreachable or holds
    /// undecodable data. Absence is never an error.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        get(self.store.as_ref(), id).await
    }
}

async fn get<S: ProjectionStore>(store: &S, id: &JobId) -> Result<Option<Job>> {
    store
        .get(id.as_str())
        .await?
        .map(|bytes| decode(&bytes))
        .transpose()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{Money, PostingData, VendorId};
    use chrono::DateTime;
    use job_postings_testing::InMemoryProjectionStore;

    fn job(id: &str) -> Job {
        Job::posted(
            JobId::from(id),
            VendorId::from("v1"),
            PostingData {
                title: "Tutoring".to_string(),
                description: "Math help".to_string(),
                latitude: 51.5,
                longitude: -1.1,
                payment: Money::from_cents(799),
            },
            DateTime::from_timestamp(1_735_689_600, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn reader_sees_writes_and_removals() {
        let view = JobView::new(Arc::new(InMemoryProjectionStore::new()));
        let reader = view.reader();

        view.put(&job("a")).await.unwrap();
        assert_eq!(reader.get(&JobId::from("a")).await.unwrap(), Some(job("a")));

        view.remove(&JobId::from("a")).await.unwrap();
        assert_eq!(reader.get(&JobId::from("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_outage_is_an_error_not_absence() {
        let store = Arc::new(InMemoryProjectionStore::new());
        let view = JobView::new(Arc::clone(&store));
        view.put(&job("a")).await.unwrap();

        store.set_unavailable(true);

        assert!(view.reader().get(&JobId::from("a")).await.is_err());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_serialization_error() {
        let store = Arc::new(InMemoryProjectionStore::new());
        store.save("a", &[0xff]).await.unwrap();

        let result = JobView::new(store).get(&JobId::from("a")).await;

        assert!(matches!(result, Err(ProjectionError::Serialization(_))));
    }

    #[tokio::test]
    async fn clear_empties_the_view() {
        let store = Arc::new(InMemoryProjectionStore::new());
        let view = JobView::new(Arc::clone(&store));
        view.put(&job("a")).await.unwrap();
        view.put(&job("b")).await.unwrap();

        view.clear().await.unwrap();

        assert!(store.is_empty());
    }
}
