//! In-memory view storage testing utilities
//!
//! Provides fast, deterministic stand-ins for the materialized view backends:
//! - [`InMemoryProjectionStore`]: HashMap-based view storage with an outage switch
//! - [`InMemoryProjectionCheckpoint`]: In-memory checkpoint tracking

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use job_postings_core::projection::{
    EventPosition, ProjectionCheckpoint, ProjectionError, ProjectionStore, Result,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// In-memory projection store for fast, deterministic testing.
///
/// Reads can be made to fail ([`InMemoryProjectionStore::set_unavailable`]) or
/// to stall ([`InMemoryProjectionStore::set_read_delay`]) so callers can
/// exercise the "view unavailable" and "lookup timed out" paths.
///
/// # Example
///
/// ```
/// use job_postings_testing::InMemoryProjectionStore;
/// use job_postings_core::projection::ProjectionStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryProjectionStore::new();
///
/// store.save("job-123", b"job data").await?;
///
/// let data = store.get("job-123").await?;
/// assert!(data.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectionStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
    read_delay: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryProjectionStore {
    /// Create a new empty in-memory projection store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every read and write fails while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every `get` by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.write().unwrap() = delay;
    }

    /// Get the number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Check if a key exists in the store without going through the trait.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().unwrap().contains_key(key)
    }

    /// Get all keys in the store
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().unwrap().keys().cloned().collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ProjectionError::Storage("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    async fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check_available()?;
        self.data
            .write()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let delay = *self.read_delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        Ok(self.data.read().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.data.write().unwrap().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_available()?;
        self.data.write().unwrap().clear();
        Ok(())
    }
}

/// In-memory checkpoint tracking for testing worker resumption.
///
/// # Example
///
/// ```
/// use job_postings_testing::InMemoryProjectionCheckpoint;
/// use job_postings_core::projection::{EventPosition, ProjectionCheckpoint};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let checkpoint = InMemoryProjectionCheckpoint::new();
///
/// let position = EventPosition::beginning().with_next_offset("job-events", 0, 42);
/// checkpoint.save_position("job-aggregator", position.clone()).await?;
///
/// let loaded = checkpoint.load_position("job-aggregator").await?;
/// assert_eq!(loaded, Some(position));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectionCheckpoint {
    positions: Arc<RwLock<HashMap<String, EventPosition>>>,
}

impl InMemoryProjectionCheckpoint {
    /// Create a new empty checkpoint tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved position for `projection_name`, read synchronously.
    #[must_use]
    pub fn position(&self, projection_name: &str) -> Option<EventPosition> {
        self.positions.read().unwrap().get(projection_name).cloned()
    }
}

impl ProjectionCheckpoint for InMemoryProjectionCheckpoint {
    fn save_position(
        &self,
        projection_name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            self.positions
                .write()
                .unwrap()
                .insert(projection_name, position);
            Ok(())
        })
    }

    fn load_position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            Ok(self.positions.read().unwrap().get(&projection_name).cloned())
        })
    }
}
