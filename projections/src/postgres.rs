//! `PostgreSQL` storage for the materialized view.
//!
//! # Overview
//!
//! - Key-value snapshot storage (`job_aggregates` table by default)
//! - Per-partition cursor for worker resumption (`projection_checkpoints`)
//! - Migrations shipped in `projections/migrations/`
//!
//! ```text
//! Event log (Redpanda)               Read side (PostgreSQL)
//! ┌─────────────────────┐          ┌─────────────────────────┐
//! │  job-events         │   →→→    │  job_aggregates         │
//! │  (ordered per key)  │  fold    │  projection_checkpoints │
//! └─────────────────────┘          └─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use job_postings_projections::postgres::*;
//!
//! let pool = connect("postgres://localhost/jobs", 10).await?;
//! let store = PostgresProjectionStore::new(pool.clone(), DEFAULT_TABLE.to_string())?;
//! store.migrate().await?;
//! store.save("job-123", &bytes).await?;
//! ```

use job_postings_core::projection::{
    EventPosition, ProjectionCheckpoint, ProjectionError, ProjectionStore, Result,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;

/// Table the aggregation worker writes unless configured otherwise.
pub const DEFAULT_TABLE: &str = "job_aggregates";

/// Open a connection pool for the view database.
///
/// # Errors
///
/// Returns [`ProjectionError::Storage`] if connection fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to connect: {e}")))
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table_name: &str) -> Result<()> {
    let mut chars = table_name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ProjectionError::Storage(format!(
            "Invalid table name: {table_name:?}"
        )))
    }
}

/// PostgreSQL-backed view store.
///
/// ```sql
/// CREATE TABLE job_aggregates (
///     key TEXT PRIMARY KEY,
///     data BYTEA NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresProjectionStore {
    /// Create a store over an existing pool, writing to `table_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if `table_name` is not a plain
    /// SQL identifier.
    pub fn new(pool: PgPool, table_name: String) -> Result<Self> {
        validate_table_name(&table_name)?;
        Ok(Self { pool, table_name })
    }

    /// Run database migrations for the view and checkpoint tables.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

impl ProjectionStore for PostgresProjectionStore {
    async fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (key, data, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE
             SET data = EXCLUDED.data, updated_at = now()",
            self.table_name
        );

        sqlx::query(&query)
            .bind(key)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to save: {e}")))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let query = format!("SELECT data FROM {} WHERE key = $1", self.table_name);

        let result: Option<(Vec<u8>,)> = sqlx::query_as(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to get: {e}")))?;

        Ok(result.map(|(data,)| data))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE key = $1", self.table_name);

        sqlx::query(&query)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to delete: {e}")))?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let query = format!("TRUNCATE TABLE {}", self.table_name);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to clear: {e}")))?;

        tracing::info!(table = %self.table_name, "View cleared");
        Ok(())
    }
}

/// PostgreSQL-backed checkpoint tracking: one row per topic partition.
///
/// ```sql
/// CREATE TABLE projection_checkpoints (
///     projection_name TEXT NOT NULL,
///     topic TEXT NOT NULL,
///     partition_id INTEGER NOT NULL,
///     next_offset BIGINT NOT NULL,
///     event_timestamp TIMESTAMPTZ,
///     updated_at TIMESTAMPTZ NOT NULL,
///     PRIMARY KEY (projection_name, topic, partition_id)
/// );
/// ```
///
/// A save replaces all rows of the projection in one transaction, so saving
/// [`EventPosition::beginning`] removes them and the next load returns `None`.
#[derive(Clone)]
pub struct PostgresProjectionCheckpoint {
    pool: PgPool,
}

impl PostgresProjectionCheckpoint {
    /// Create a new checkpoint tracker using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type CheckpointRow = (String, i32, i64, Option<DateTime<Utc>>);

/// Rebuild a position from its rows; no rows means no checkpoint.
fn position_from_rows(rows: Vec<CheckpointRow>) -> Option<EventPosition> {
    if rows.is_empty() {
        return None;
    }
    let timestamp = rows.iter().filter_map(|(_, _, _, at)| *at).max();
    let mut position = rows
        .into_iter()
        .fold(EventPosition::beginning(), |position, (topic, partition, next, _)| {
            position.with_next_offset(topic, partition, next)
        });
    position.timestamp = timestamp;
    Some(position)
}

impl ProjectionCheckpoint for PostgresProjectionCheckpoint {
    fn save_position(
        &self,
        projection_name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            let failed = |e: sqlx::Error| ProjectionError::Checkpoint(format!("Failed to save checkpoint: {e}"));
            let mut tx = self.pool.begin().await.map_err(failed)?;

            sqlx::query("DELETE FROM projection_checkpoints WHERE projection_name = $1")
                .bind(&projection_name)
                .execute(&mut *tx)
                .await
                .map_err(failed)?;

            for (topic, partition, next) in position.offsets() {
                sqlx::query(
                    "INSERT INTO projection_checkpoints
                         (projection_name, topic, partition_id, next_offset, event_timestamp, updated_at)
                     VALUES ($1, $2, $3, $4, $5, now())",
                )
                .bind(&projection_name)
                .bind(topic)
                .bind(partition)
                .bind(next)
                .bind(position.timestamp)
                .execute(&mut *tx)
                .await
                .map_err(failed)?;
            }

            tx.commit().await.map_err(failed)?;
            Ok(())
        })
    }

    fn load_position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            let rows: Vec<CheckpointRow> = sqlx::query_as(
                "SELECT topic, partition_id, next_offset, event_timestamp
                 FROM projection_checkpoints
                 WHERE projection_name = $1",
            )
            .bind(projection_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ProjectionError::Checkpoint(format!("Failed to load checkpoint: {e}")))?;

            Ok(position_from_rows(rows))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_accepted() {
        assert!(validate_table_name("job_aggregates").is_ok());
        assert!(validate_table_name("_v2").is_ok());
    }

    #[test]
    fn no_rows_is_no_checkpoint() {
        assert_eq!(position_from_rows(Vec::new()), None);
    }

    #[test]
    fn rows_become_one_position_with_the_latest_timestamp() {
        let early = DateTime::from_timestamp(1_735_689_600, 0);
        let late = DateTime::from_timestamp(1_735_689_660, 0);
        let rows = vec![
            ("job-events".to_string(), 0, 12, early),
            ("job-events".to_string(), 1, 4, late),
        ];

        let position = position_from_rows(rows).unwrap_or_default();

        assert_eq!(position.next_offset("job-events", 0), Some(12));
        assert_eq!(position.next_offset("job-events", 1), Some(4));
        assert_eq!(position.timestamp, late);
    }

    #[test]
    fn injection_attempts_are_rejected() {
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1jobs").is_err());
        assert!(validate_table_name("jobs; DROP TABLE x").is_err());
        assert!(validate_table_name("public.jobs").is_err());
    }
}
