//! # Job Postings Testing
//!
//! Testing utilities for the job postings service.
//!
//! This crate provides:
//! - Deterministic environment doubles ([`FixedClock`], [`SequentialIdGenerator`])
//! - A retaining in-memory event log ([`InMemoryEventBus`]) with failure injection
//! - In-memory view storage and checkpoints ([`InMemoryProjectionStore`],
//!   [`InMemoryProjectionCheckpoint`])
//!
//! ## Example
//!
//! ```ignore
//! use job_postings_testing::{test_clock, InMemoryEventBus, SequentialIdGenerator};
//!
//! #[tokio::test]
//! async fn rejects_unknown_job() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let service = service_over(bus.clone());
//!
//!     let outcome = service.update(&JobId::from("nope"), &vendor, data).await?;
//!     assert_eq!(outcome, JobOperationResult::NotFound);
//!     assert_eq!(bus.publish_count(), 0);
//! }
//! ```

use chrono::{DateTime, Utc};
use job_postings_core::environment::{Clock, IdGenerator};

pub mod event_bus;
pub mod projection_mocks;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::advance`].
    ///
    /// # Example
    ///
    /// ```
    /// use job_postings_testing::mocks::FixedClock;
    /// use job_postings_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `by`.
        #[allow(clippy::unwrap_used)] // Test double; lock is never poisoned
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `"{prefix}-1"`, `"{prefix}-2"`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator producing ids with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new("job")
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from many tests; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use projection_mocks::{InMemoryProjectionCheckpoint, InMemoryProjectionStore};
