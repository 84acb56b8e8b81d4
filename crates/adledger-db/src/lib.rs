//! AdLedger Database Layer
//!
//! `SQLite` persistence for the acquisition-and-reconciliation pipeline.
//! Uses `SQLx` with embedded migrations.
//!
//! # Tables
//!
//! - **connections** / **keywords**: inputs owned by the account layer
//! - **rank_targets** / **rank_observations**: append-only position log
//! - **sync_tasks** / **sync_task_events**: per-day work units and their history
//! - **metric_records**: per-source and reconciled campaign metrics
//! - **validation_results**: one verdict per sync task
//! - **scheduled_jobs**: periodic job bookkeeping
//!
//! # Example
//!
//! ```ignore
//! use adledger_db::Database;
//!
//! let db = Database::new("adledger.db", 5).await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod codec;
pub mod connection;
pub mod connections;
pub mod error;
pub mod keywords;
pub mod metric_records;
pub mod migrations;
pub mod rankings;
/// Sync task lifecycle and its event log.
pub mod sync_tasks;
pub mod validation_results;

pub use error::{DatabaseError, Result};

use sqlx::SqlitePool;
use std::path::Path;

/// High-level database handle: a pool plus migrations and job bookkeeping.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// # Arguments
    /// * `path` - Path to the database file (or `:memory:` for in-memory)
    /// * `max_connections` - Pool size for file databases
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let pool = connection::open_pool(path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Highest applied migration version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get all scheduled jobs
    pub async fn get_scheduled_jobs(&self) -> Result<Vec<adledger_scheduler::ScheduledJob>> {
        let rows = sqlx::query_as::<_, (String, String, i64, String, Option<String>, i64)>(
            r"SELECT id, job_type, interval_hours, next_run_at, last_run_at, enabled
               FROM scheduled_jobs",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, job_type_str, interval_hours, next_run_at, last_run_at, enabled)| {
                    let job_type: adledger_scheduler::JobType =
                        serde_json::from_str(&format!("\"{job_type_str}\"")).map_err(|e| {
                            DatabaseError::Decode(format!(
                                "Invalid job_type '{job_type_str}' in scheduled_jobs table: {e}"
                            ))
                        })?;
                    Ok(adledger_scheduler::ScheduledJob {
                        id,
                        job_type,
                        interval_hours: codec::decode_count(interval_hours),
                        next_run_at,
                        last_run_at,
                        enabled: enabled != 0,
                    })
                },
            )
            .collect()
    }

    /// Update job's `next_run_at` and `last_run_at` timestamps
    pub async fn update_job_next_run(
        &self,
        job_id: &str,
        next_run_at: &str,
        last_run_at: &str,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE scheduled_jobs SET next_run_at = ?, last_run_at = ? WHERE id = ?")
                .bind(next_run_at)
                .bind(last_run_at)
                .bind(job_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFoundWithMessage(format!(
                "Scheduled job '{job_id}' not found"
            )));
        }

        Ok(())
    }

    /// Change how often a job runs.
    pub async fn set_job_interval(&self, job_id: &str, interval_hours: u32) -> Result<()> {
        let result = sqlx::query("UPDATE scheduled_jobs SET interval_hours = ? WHERE id = ?")
            .bind(i64::from(interval_hours.max(1)))
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFoundWithMessage(format!(
                "Scheduled job '{job_id}' not found"
            )));
        }

        Ok(())
    }
}
