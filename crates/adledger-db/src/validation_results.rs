//! Validation verdicts, one per sync task.

use crate::codec::{decode_time, now};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Outcome of the post-reconciliation checks for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Task the verdict belongs to
    pub task_id: String,
    /// Logical AND of every check
    pub passed: bool,
    /// Check name to outcome
    pub checks: BTreeMap<String, bool>,
    /// Human-readable summary
    pub note: Option<String>,
    /// When the checks ran
    pub validated_at: DateTime<Utc>,
}

/// Store the verdict for a task, replacing any earlier one.
pub async fn upsert(
    pool: &SqlitePool,
    task_id: &str,
    passed: bool,
    checks: &BTreeMap<String, bool>,
    note: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO validation_results (task_id, passed, checks, note, validated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (task_id) DO UPDATE SET
             passed = excluded.passed,
             checks = excluded.checks,
             note = excluded.note,
             validated_at = excluded.validated_at",
    )
    .bind(task_id)
    .bind(passed)
    .bind(serde_json::to_string(checks)?)
    .bind(note)
    .bind(now())
    .execute(pool)
    .await?;

    Ok(())
}

/// The stored verdict for a task, if it was validated.
pub async fn get(pool: &SqlitePool, task_id: &str) -> Result<Option<ValidationResult>> {
    let row = sqlx::query(
        "SELECT task_id, passed, checks, note, validated_at FROM validation_results WHERE task_id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let checks: String = row.try_get("checks")?;
    let validated_at: String = row.try_get("validated_at")?;

    Ok(Some(ValidationResult {
        task_id: row.try_get("task_id")?,
        passed: row.try_get("passed")?,
        checks: serde_json::from_str(&checks)?,
        note: row.try_get("note")?,
        validated_at: decode_time(&validated_at)?,
    }))
}
