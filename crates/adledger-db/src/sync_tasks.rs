//! Per-day sync tasks: `pending → running → {completed | failed | partial}`.
//!
//! A task row is never deleted. Re-creating a failed task resets it in place,
//! so every transition is also appended to `sync_task_events`.

use crate::codec::{decode_count, decode_date, decode_optional_time, encode_date, now};
use crate::error::{DatabaseError, Result};
use adledger_core::TaskStatus;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqliteExecutor, SqlitePool};

const SELECT_TASK: &str = "SELECT id, connection_id, target_date, status, attempts, total_failures,
        started_at, completed_at, error_message
     FROM sync_tasks";

/// One day of work for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTask {
    /// Unique identifier
    pub id: String,
    /// Connection being synced
    pub connection_id: String,
    /// Day whose metrics are fetched
    pub target_date: NaiveDate,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Runs since the last reset
    pub attempts: u32,
    /// Lifetime failure count, never reset automatically
    pub total_failures: u32,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the last run finished
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason or partial-run note
    pub error_message: Option<String>,
}

/// What `upsert_daily` did with the `(connection, date)` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskUpsert {
    /// No task existed; a pending one was created
    Created,
    /// A failed task was reset to pending
    Reset,
    /// The existing task was left as is
    Unchanged,
    /// A failed task hit the failure cap and was left failed
    Capped,
}

/// A recorded status change.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    /// Task the event belongs to
    pub task_id: String,
    /// New status, or `reset`
    pub status: String,
    /// Attempt number at the time of the event
    pub attempt: u32,
    /// Error or note carried by the transition
    pub error_message: Option<String>,
    /// When it happened
    pub recorded_at: DateTime<Utc>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncTask> {
    let target_date: String = row.try_get("target_date")?;
    let status: String = row.try_get("status")?;

    Ok(SyncTask {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        target_date: decode_date(&target_date)?,
        status: status.parse()?,
        attempts: decode_count(row.try_get("attempts")?),
        total_failures: decode_count(row.try_get("total_failures")?),
        started_at: decode_optional_time(row.try_get("started_at")?)?,
        completed_at: decode_optional_time(row.try_get("completed_at")?)?,
        error_message: row.try_get("error_message")?,
    })
}

async fn record_event<'e, E: SqliteExecutor<'e>>(
    executor: E,
    task_id: &str,
    status: &str,
    attempt: i64,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_task_events (task_id, status, attempt, error_message, recorded_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(status)
    .bind(attempt)
    .bind(error_message)
    .bind(now())
    .execute(executor)
    .await?;
    Ok(())
}

/// Look up a task by id.
pub async fn get_task(pool: &SqlitePool, id: &str) -> Result<Option<SyncTask>> {
    let row = sqlx::query(&format!("{SELECT_TASK} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Look up the task for `(connection, date)`.
pub async fn find_task(
    pool: &SqlitePool,
    connection_id: &str,
    target_date: NaiveDate,
) -> Result<Option<SyncTask>> {
    let row = sqlx::query(&format!("{SELECT_TASK} WHERE connection_id = ? AND target_date = ?"))
        .bind(connection_id)
        .bind(encode_date(target_date))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Make sure a runnable task exists for `(connection, date)`.
///
/// Missing tasks are created pending. Failed tasks are reset to pending with
/// `attempts = 0` unless their lifetime failures reached `max_failures`.
/// Every other state is left untouched.
pub async fn upsert_daily(
    pool: &SqlitePool,
    connection_id: &str,
    target_date: NaiveDate,
    max_failures: u32,
) -> Result<(TaskUpsert, SyncTask)> {
    let date = encode_date(target_date);
    let mut tx = pool.begin().await?;

    let existing = sqlx::query(&format!("{SELECT_TASK} WHERE connection_id = ? AND target_date = ?"))
        .bind(connection_id)
        .bind(&date)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(from_row)
        .transpose()?;

    let (outcome, id) = match existing {
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let timestamp = now();
            sqlx::query(
                "INSERT INTO sync_tasks (id, connection_id, target_date, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(connection_id)
            .bind(&date)
            .bind(TaskStatus::Pending.as_str())
            .bind(&timestamp)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;
            record_event(&mut *tx, &id, TaskStatus::Pending.as_str(), 0, None).await?;
            (TaskUpsert::Created, id)
        }
        Some(task) if task.status == TaskStatus::Failed && task.total_failures >= max_failures => {
            (TaskUpsert::Capped, task.id)
        }
        Some(task) if task.status == TaskStatus::Failed => {
            sqlx::query(
                "UPDATE sync_tasks SET status = ?, attempts = 0, started_at = NULL,
                     completed_at = NULL, error_message = NULL, updated_at = ?
                 WHERE id = ?",
            )
            .bind(TaskStatus::Pending.as_str())
            .bind(now())
            .bind(&task.id)
            .execute(&mut *tx)
            .await?;
            record_event(&mut *tx, &task.id, "reset", 0, task.error_message.as_deref()).await?;
            (TaskUpsert::Reset, task.id)
        }
        Some(task) => (TaskUpsert::Unchanged, task.id),
    };

    tx.commit().await?;

    if outcome == TaskUpsert::Capped {
        tracing::warn!(
            "Task {} for {} on {} reached {} failures; manual reset required",
            id,
            connection_id,
            date,
            max_failures
        );
    }

    let task = get_task(pool, &id).await?.ok_or(DatabaseError::NotFound)?;
    Ok((outcome, task))
}

async fn reject(pool: &SqlitePool, id: &str, expected: TaskStatus, target: &str) -> DatabaseError {
    match get_task(pool, id).await {
        Ok(Some(task)) => DatabaseError::InvalidTransition(format!(
            "task '{id}' is {}, cannot move to {target} (expected {expected})",
            task.status
        )),
        Ok(None) => DatabaseError::NotFoundWithMessage(format!("Sync task '{id}' not found")),
        Err(e) => e,
    }
}

/// `pending → running`: stamps `started_at` and counts the attempt.
pub async fn mark_running(pool: &SqlitePool, id: &str) -> Result<SyncTask> {
    let timestamp = now();
    let mut tx = pool.begin().await?;

    let attempt: Option<i64> = sqlx::query_scalar(
        "UPDATE sync_tasks SET status = ?, attempts = attempts + 1, started_at = ?, updated_at = ?
         WHERE id = ? AND status = ?
         RETURNING attempts",
    )
    .bind(TaskStatus::Running.as_str())
    .bind(&timestamp)
    .bind(&timestamp)
    .bind(id)
    .bind(TaskStatus::Pending.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(attempt) = attempt else {
        tx.rollback().await?;
        return Err(reject(pool, id, TaskStatus::Pending, "running").await);
    };
    record_event(&mut *tx, id, TaskStatus::Running.as_str(), attempt, None).await?;
    tx.commit().await?;

    get_task(pool, id).await?.ok_or(DatabaseError::NotFound)
}

/// `running → completed`, or `running → failed` when `error` is given.
/// Failures also count towards `total_failures`.
pub async fn mark_completed(pool: &SqlitePool, id: &str, error: Option<&str>) -> Result<SyncTask> {
    let status = if error.is_some() { TaskStatus::Failed } else { TaskStatus::Completed };
    finish(pool, id, status, error).await
}

/// `running → partial` with a note naming what failed.
pub async fn mark_partial(pool: &SqlitePool, id: &str, note: &str) -> Result<SyncTask> {
    finish(pool, id, TaskStatus::Partial, Some(note)).await
}

async fn finish(
    pool: &SqlitePool,
    id: &str,
    status: TaskStatus,
    message: Option<&str>,
) -> Result<SyncTask> {
    let timestamp = now();
    let failed = i64::from(status == TaskStatus::Failed);
    let mut tx = pool.begin().await?;

    let attempt: Option<i64> = sqlx::query_scalar(
        "UPDATE sync_tasks SET status = ?, completed_at = ?, error_message = ?,
             total_failures = total_failures + ?, updated_at = ?
         WHERE id = ? AND status = ?
         RETURNING attempts",
    )
    .bind(status.as_str())
    .bind(&timestamp)
    .bind(message)
    .bind(failed)
    .bind(&timestamp)
    .bind(id)
    .bind(TaskStatus::Running.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(attempt) = attempt else {
        tx.rollback().await?;
        return Err(reject(pool, id, TaskStatus::Running, status.as_str()).await);
    };
    record_event(&mut *tx, id, status.as_str(), attempt, message).await?;
    tx.commit().await?;

    get_task(pool, id).await?.ok_or(DatabaseError::NotFound)
}

/// Manual recovery: put a finished task back to pending with a fresh
/// failure budget. Running tasks cannot be reset.
pub async fn reset_task(pool: &SqlitePool, id: &str) -> Result<SyncTask> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE sync_tasks SET status = ?, attempts = 0, total_failures = 0, started_at = NULL,
             completed_at = NULL, error_message = NULL, updated_at = ?
         WHERE id = ? AND status != ?",
    )
    .bind(TaskStatus::Pending.as_str())
    .bind(now())
    .bind(id)
    .bind(TaskStatus::Running.as_str())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(match get_task(pool, id).await? {
            Some(_) => DatabaseError::InvalidTransition(format!("task '{id}' is running")),
            None => DatabaseError::NotFoundWithMessage(format!("Sync task '{id}' not found")),
        });
    }
    record_event(&mut *tx, id, "reset", 0, Some("manual reset")).await?;
    tx.commit().await?;

    tracing::info!("Task {} manually reset", id);
    get_task(pool, id).await?.ok_or(DatabaseError::NotFound)
}

/// Fail `running` tasks that started before `started_before`.
///
/// A process killed mid-run leaves its task `running`, which neither
/// `upsert_daily` nor `reset_task` will touch. Failing it counts towards
/// `total_failures` and lets the next `upsert_daily` reset it as usual.
pub async fn fail_stale_running(
    pool: &SqlitePool,
    started_before: DateTime<Utc>,
) -> Result<Vec<SyncTask>> {
    let rows = sqlx::query(&format!("{SELECT_TASK} WHERE status = ?"))
        .bind(TaskStatus::Running.as_str())
        .fetch_all(pool)
        .await?;
    let stale: Vec<SyncTask> = rows
        .iter()
        .map(from_row)
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|task| task.started_at.map_or(true, |started| started < started_before))
        .collect();
    if stale.is_empty() {
        return Ok(Vec::new());
    }

    let timestamp = now();
    let mut tx = pool.begin().await?;
    let mut failed_ids = Vec::with_capacity(stale.len());
    for task in &stale {
        let message = match task.started_at {
            Some(started) => format!("abandoned while running since {}", started.to_rfc3339()),
            None => "abandoned while running".to_string(),
        };
        let attempt: Option<i64> = sqlx::query_scalar(
            "UPDATE sync_tasks SET status = ?, completed_at = ?, error_message = ?,
                 total_failures = total_failures + 1, updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING attempts",
        )
        .bind(TaskStatus::Failed.as_str())
        .bind(&timestamp)
        .bind(&message)
        .bind(&timestamp)
        .bind(&task.id)
        .bind(TaskStatus::Running.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(attempt) = attempt {
            record_event(&mut *tx, &task.id, TaskStatus::Failed.as_str(), attempt, Some(&message))
                .await?;
            failed_ids.push(task.id.clone());
        }
    }
    tx.commit().await?;

    let mut failed = Vec::with_capacity(failed_ids.len());
    for id in &failed_ids {
        tracing::warn!("Task {} was left running; marked failed", id);
        if let Some(task) = get_task(pool, id).await? {
            failed.push(task);
        }
    }
    Ok(failed)
}

/// Pending tasks, optionally for one connection, oldest date first.
pub async fn list_pending(pool: &SqlitePool, connection_id: Option<&str>) -> Result<Vec<SyncTask>> {
    let rows = match connection_id {
        Some(connection_id) => {
            sqlx::query(&format!(
                "{SELECT_TASK} WHERE status = ? AND connection_id = ? ORDER BY target_date, connection_id"
            ))
            .bind(TaskStatus::Pending.as_str())
            .bind(connection_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("{SELECT_TASK} WHERE status = ? ORDER BY target_date, connection_id"))
                .bind(TaskStatus::Pending.as_str())
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(from_row).collect()
}

/// Every task of a connection, newest date first.
pub async fn list_for_connection(pool: &SqlitePool, connection_id: &str) -> Result<Vec<SyncTask>> {
    let rows = sqlx::query(&format!("{SELECT_TASK} WHERE connection_id = ? ORDER BY target_date DESC"))
        .bind(connection_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Transition history of a task, oldest first.
pub async fn list_events(pool: &SqlitePool, task_id: &str) -> Result<Vec<TaskEvent>> {
    let rows = sqlx::query(
        "SELECT task_id, status, attempt, error_message, recorded_at
         FROM sync_task_events WHERE task_id = ? ORDER BY id",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let recorded_at: String = row.try_get("recorded_at")?;
            Ok(TaskEvent {
                task_id: row.try_get("task_id")?,
                status: row.try_get("status")?,
                attempt: decode_count(row.try_get("attempt")?),
                error_message: row.try_get("error_message")?,
                recorded_at: crate::codec::decode_time(&recorded_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::create_connection;
    use crate::Database;
    use adledger_core::Platform;

    async fn setup() -> (Database, String) {
        let db = Database::new(":memory:", 1).await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let connection = create_connection(db.pool(), "client-1", Platform::NaverSearchAd, "{}")
            .await
            .expect("create connection");
        (db, connection.id)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    async fn fail_once(db: &Database, id: &str) {
        mark_running(db.pool(), id).await.expect("mark running");
        mark_completed(db.pool(), id, Some("boom")).await.expect("mark failed");
    }

    #[tokio::test]
    async fn test_upsert_daily_is_idempotent() {
        let (db, conn) = setup().await;

        let (first, task) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("first");
        let (second, again) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("second");

        assert_eq!(first, TaskUpsert::Created);
        assert_eq!(second, TaskUpsert::Unchanged);
        assert_eq!(task.id, again.id);
        assert_eq!(list_for_connection(db.pool(), &conn).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_task_reset_to_pending() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("create");
        fail_once(&db, &task.id).await;

        let (outcome, reset) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("reset");

        assert_eq!(outcome, TaskUpsert::Reset);
        assert_eq!(reset.id, task.id);
        assert_eq!(reset.status, TaskStatus::Pending);
        assert_eq!(reset.attempts, 0);
        assert_eq!(reset.total_failures, 1);
        assert!(reset.error_message.is_none());

        let events: Vec<_> = list_events(db.pool(), &task.id)
            .await
            .expect("events")
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(events, vec!["pending", "running", "failed", "reset"]);
    }

    #[tokio::test]
    async fn test_completed_task_untouched() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("create");
        mark_running(db.pool(), &task.id).await.expect("running");
        let done = mark_completed(db.pool(), &task.id, None).await.expect("completed");

        let (outcome, after) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("upsert");

        assert_eq!(outcome, TaskUpsert::Unchanged);
        assert_eq!(after, done);
        assert_eq!(after.attempts, 1);
        assert!(after.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_cap_blocks_reset() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(12), 2).await.expect("create");

        fail_once(&db, &task.id).await;
        assert_eq!(upsert_daily(db.pool(), &conn, day(12), 2).await.expect("reset").0, TaskUpsert::Reset);
        fail_once(&db, &task.id).await;

        let (outcome, capped) = upsert_daily(db.pool(), &conn, day(12), 2).await.expect("capped");
        assert_eq!(outcome, TaskUpsert::Capped);
        assert_eq!(capped.status, TaskStatus::Failed);

        let manual = reset_task(db.pool(), &task.id).await.expect("manual reset");
        assert_eq!(manual.status, TaskStatus::Pending);
        assert_eq!(manual.total_failures, 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions_rejected() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("create");

        let result = mark_completed(db.pool(), &task.id, None).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition(_))));

        mark_running(db.pool(), &task.id).await.expect("running");
        let result = mark_running(db.pool(), &task.id).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition(_))));

        let result = reset_task(db.pool(), &task.id).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition(_))));

        let result = mark_running(db.pool(), "missing").await;
        assert!(matches!(result, Err(DatabaseError::NotFoundWithMessage(_))));
    }

    #[tokio::test]
    async fn test_partial_keeps_note() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(11), 5).await.expect("create");
        mark_running(db.pool(), &task.id).await.expect("running");

        let partial = mark_partial(db.pool(), &task.id, "report: unavailable").await.expect("partial");

        assert_eq!(partial.status, TaskStatus::Partial);
        assert_eq!(partial.error_message.as_deref(), Some("report: unavailable"));
        assert_eq!(partial.total_failures, 0);
    }

    #[tokio::test]
    async fn test_stale_running_task_recovers() {
        let (db, conn) = setup().await;
        let (_, task) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("create");
        let started = mark_running(db.pool(), &task.id).await.expect("running");

        // Still inside its lease.
        let cutoff = started.started_at.expect("started_at") - chrono::Duration::minutes(5);
        assert!(fail_stale_running(db.pool(), cutoff).await.expect("recover").is_empty());
        let (outcome, _) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("upsert");
        assert_eq!(outcome, TaskUpsert::Unchanged);

        let later = Utc::now() + chrono::Duration::seconds(1);
        let recovered = fail_stale_running(db.pool(), later).await.expect("recover");
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].status, TaskStatus::Failed);
        assert_eq!(recovered[0].total_failures, 1);
        assert!(recovered[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("abandoned while running")));

        let (outcome, reset) = upsert_daily(db.pool(), &conn, day(12), 5).await.expect("reset");
        assert_eq!(outcome, TaskUpsert::Reset);
        assert_eq!(reset.status, TaskStatus::Pending);
        assert_eq!(list_pending(db.pool(), Some(&conn)).await.expect("pending").len(), 1);

        let events: Vec<_> = list_events(db.pool(), &task.id)
            .await
            .expect("events")
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(events, vec!["pending", "running", "failed", "reset"]);
    }

    #[tokio::test]
    async fn test_list_pending_orders_by_date() {
        let (db, conn) = setup().await;
        for d in [12, 10, 11] {
            upsert_daily(db.pool(), &conn, day(d), 5).await.expect("create");
        }
        let (_, running) = upsert_daily(db.pool(), &conn, day(9), 5).await.expect("create");
        mark_running(db.pool(), &running.id).await.expect("running");

        let pending = list_pending(db.pool(), Some(&conn)).await.expect("pending");
        let dates: Vec<_> = pending.iter().map(|t| t.target_date).collect();
        assert_eq!(dates, vec![day(10), day(11), day(12)]);
        assert_eq!(list_pending(db.pool(), None).await.expect("all").len(), 3);
    }
}
