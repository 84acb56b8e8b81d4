//! Sync orchestrator: daily tasks, rank capture and metric reconciliation.
//!
//! A run creates the per-day tasks of every eligible connection, captures
//! rankings for every tracked keyword of their clients, then executes the
//! pending tasks one connection at a time. Failures are recorded in the
//! run summary and never abort the batch.

use crate::error::{Result, SyncError};
use crate::guard::{InFlightGuard, ScrapeKey};
use crate::notify::{Notifier, TracingNotifier};
use crate::persist::persist_rankings;
use crate::reconcile::reconcile_date;
use crate::sources::{MetricSource, MetricSourceProvider, SourceError};
use crate::summary::RunSummary;
use crate::validate::validate_task;
use adledger_core::{ConnectionStatus, RankPlatform, SyncConfig};
use adledger_db::connections::{self, Connection};
use adledger_db::metric_records::MetricRecord;
use adledger_db::sync_tasks::{self, SyncTask, TaskUpsert};
use adledger_db::{keywords, Database};
use adledger_scraper::RankingSource;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The three ranking surfaces.
#[derive(Clone)]
pub struct RankingSources {
    pub place: Arc<dyn RankingSource>,
    pub view: Arc<dyn RankingSource>,
    pub ad: Arc<dyn RankingSource>,
}

/// How a single task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Partial,
    Failed,
    /// Failed because the platform refused the credentials
    AuthRejected,
}

/// Result of scraping one keyword on one surface.
#[derive(Debug)]
struct ScrapeOutcome {
    platform: RankPlatform,
    result: std::result::Result<usize, String>,
}

/// Drives acquisition, reconciliation and validation.
pub struct SyncOrchestrator {
    db: Database,
    rankings: RankingSources,
    sources: Arc<dyn MetricSourceProvider>,
    notifier: Arc<dyn Notifier>,
    guard: InFlightGuard,
    config: SyncConfig,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        db: Database,
        rankings: RankingSources,
        sources: Arc<dyn MetricSourceProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            rankings,
            sources,
            notifier: Arc::new(TracingNotifier),
            guard: InFlightGuard::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share an in-flight guard with other orchestrators in the process.
    #[must_use]
    pub fn with_guard(mut self, guard: InFlightGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The duplicate-scrape guard this orchestrator checks.
    pub fn guard(&self) -> &InFlightGuard {
        &self.guard
    }

    /// Run the whole pipeline for one connection, or every active one.
    ///
    /// `days` defaults to `sync.default_days`. Only an unknown
    /// `connection_id` or a failing database surfaces as an error; every
    /// other failure lands in the returned summary.
    pub async fn run(&self, connection_id: Option<&str>, days: Option<u32>) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.config.max_summary_errors);
        let days = days.unwrap_or(self.config.default_days);
        let connections = self.eligible_connections(connection_id, &mut summary).await?;
        summary.connections = connections.len();

        tracing::info!(
            "Starting sync run: {} connections, {} days",
            connections.len(),
            days
        );

        self.fail_abandoned_tasks(&mut summary).await?;
        for connection in &connections {
            self.create_daily_tasks(&connection.id, days, &mut summary).await?;
        }

        let clients: BTreeSet<&str> = connections.iter().map(|c| c.client_id.as_str()).collect();
        let captured_at = Utc::now();
        for client_id in clients {
            self.capture_client_rankings(client_id, captured_at, &mut summary)
                .await?;
        }

        for connection in &connections {
            self.sync_connection(connection, &mut summary).await?;
        }

        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    /// Capture rankings for every client with an active connection, without
    /// touching metric tasks.
    pub async fn capture_rankings(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.config.max_summary_errors);
        let connections = connections::list_active(self.db.pool()).await?;
        let clients: BTreeSet<&str> = connections.iter().map(|c| c.client_id.as_str()).collect();
        let captured_at = Utc::now();

        for client_id in clients {
            self.capture_client_rankings(client_id, captured_at, &mut summary)
                .await?;
        }

        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    async fn eligible_connections(
        &self,
        connection_id: Option<&str>,
        summary: &mut RunSummary,
    ) -> Result<Vec<Connection>> {
        let Some(id) = connection_id else {
            return Ok(connections::list_active(self.db.pool()).await?);
        };

        let connection = connections::get_connection(self.db.pool(), id)
            .await?
            .ok_or_else(|| SyncError::ConnectionNotFound(id.to_string()))?;
        if connection.status != ConnectionStatus::Active {
            tracing::warn!("Skipping connection {} ({})", id, connection.status);
            summary.record_error(format!("connection {id} is {}", connection.status));
            return Ok(Vec::new());
        }
        Ok(vec![connection])
    }

    /// Fail tasks left running longer than `sync.running_lease_minutes`, so
    /// `create_daily_tasks` can reset them.
    async fn fail_abandoned_tasks(&self, summary: &mut RunSummary) -> Result<()> {
        let lease = Duration::minutes(i64::from(self.config.running_lease_minutes));
        let abandoned = sync_tasks::fail_stale_running(self.db.pool(), Utc::now() - lease).await?;
        for task in &abandoned {
            summary.tasks_recovered += 1;
            summary.record_error(format!(
                "task {}/{} was abandoned while running",
                task.connection_id, task.target_date
            ));
        }
        Ok(())
    }

    /// Ensure a runnable task for each of the last `days` days, yesterday
    /// first. Today is skipped because the platform has not closed it yet.
    pub async fn create_daily_tasks(
        &self,
        connection_id: &str,
        days: u32,
        summary: &mut RunSummary,
    ) -> Result<Vec<SyncTask>> {
        let today = Utc::now().date_naive();
        let mut tasks = Vec::new();

        for date in backfill_dates(today, days) {
            let (outcome, task) = sync_tasks::upsert_daily(
                self.db.pool(),
                connection_id,
                date,
                self.config.max_task_failures,
            )
            .await?;
            match outcome {
                TaskUpsert::Created => summary.tasks_created += 1,
                TaskUpsert::Reset => summary.tasks_reset += 1,
                TaskUpsert::Capped => {
                    summary.tasks_capped += 1;
                    summary.record_error(format!(
                        "task {connection_id}/{date} reached the failure cap"
                    ));
                }
                TaskUpsert::Unchanged => {}
            }
            tasks.push(task);
        }

        Ok(tasks)
    }

    async fn capture_client_rankings(
        &self,
        client_id: &str,
        captured_at: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let tracked = keywords::list_for_client(self.db.pool(), client_id).await?;
        if tracked.is_empty() {
            return Ok(());
        }
        tracing::info!("Capturing rankings for {} keywords of {}", tracked.len(), client_id);

        let outcomes = join_all(
            tracked
                .iter()
                .map(|k| self.scrape_keyword(client_id, &k.keyword, captured_at)),
        )
        .await;

        for (keyword, outcome) in tracked.iter().zip(outcomes) {
            for scrape in outcome {
                match scrape.result {
                    Ok(count) => summary.add_observations(scrape.platform, count),
                    Err(e) => summary.record_error(format!(
                        "{} '{}': {}",
                        scrape.platform, keyword.keyword, e
                    )),
                }
            }
        }
        Ok(())
    }

    /// Place and View concurrently, then Ad.
    async fn scrape_keyword(
        &self,
        client_id: &str,
        keyword: &str,
        captured_at: DateTime<Utc>,
    ) -> Vec<ScrapeOutcome> {
        let (place, view) = tokio::join!(
            self.scrape(self.rankings.place.as_ref(), client_id, keyword, captured_at),
            self.scrape(self.rankings.view.as_ref(), client_id, keyword, captured_at),
        );
        let ad = self
            .scrape(self.rankings.ad.as_ref(), client_id, keyword, captured_at)
            .await;
        vec![place, view, ad]
    }

    /// Scrape one surface for a keyword under the in-flight guard and
    /// persist what it returned.
    pub async fn scrape_and_persist(
        &self,
        source: &dyn RankingSource,
        client_id: &str,
        keyword: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<usize> {
        let platform = source.platform();
        let _permit = self
            .guard
            .try_acquire(ScrapeKey::new(client_id, platform, keyword))?;

        let items = source.get_rankings(keyword).await;
        if items.is_empty() {
            tracing::warn!("{} returned no rankings for '{}'", platform, keyword);
            return Ok(0);
        }

        persist_rankings(self.db.pool(), client_id, keyword, platform, &items, captured_at).await
    }

    async fn scrape(
        &self,
        source: &dyn RankingSource,
        client_id: &str,
        keyword: &str,
        captured_at: DateTime<Utc>,
    ) -> ScrapeOutcome {
        ScrapeOutcome {
            platform: source.platform(),
            result: self
                .scrape_and_persist(source, client_id, keyword, captured_at)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    /// Execute the pending tasks of one connection, oldest day first.
    async fn sync_connection(&self, connection: &Connection, summary: &mut RunSummary) -> Result<()> {
        let pending = sync_tasks::list_pending(self.db.pool(), Some(&connection.id)).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let sources = match self.sources.sources_for(connection) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("Connection {} has unusable credentials: {}", connection.id, e);
                for task in &pending {
                    self.fail_task(task, &format!("credentials: {e}"), summary).await?;
                }
                return Ok(());
            }
        };

        for task in pending {
            let task_id = task.id.clone();
            match self.execute_task(connection, task, &sources, summary).await {
                Ok(TaskOutcome::AuthRejected) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Task {} aborted: {}", task_id, e);
                    summary.tasks_failed += 1;
                    summary.record_error(format!("task {task_id}: {e}"));
                    if let Err(mark) =
                        sync_tasks::mark_completed(self.db.pool(), &task_id, Some(&e.to_string())).await
                    {
                        tracing::warn!("Could not mark task {} failed: {}", task_id, mark);
                    }
                }
            }
        }
        Ok(())
    }

    async fn fail_task(&self, task: &SyncTask, message: &str, summary: &mut RunSummary) -> Result<()> {
        sync_tasks::mark_running(self.db.pool(), &task.id).await?;
        sync_tasks::mark_completed(self.db.pool(), &task.id, Some(message)).await?;
        summary.tasks_failed += 1;
        summary.record_error(format!("{}/{}: {}", task.connection_id, task.target_date, message));
        Ok(())
    }

    /// Run one task through every metric source, reconcile and validate.
    pub async fn execute_task(
        &self,
        connection: &Connection,
        task: SyncTask,
        sources: &[Box<dyn MetricSource>],
        summary: &mut RunSummary,
    ) -> Result<TaskOutcome> {
        let pool = self.db.pool();
        let task = sync_tasks::mark_running(pool, &task.id).await?;
        let date = task.target_date;
        tracing::info!(
            "Syncing {} for {} (attempt {})",
            connection.id,
            date,
            task.attempts
        );

        let mut failures = Vec::new();
        let mut fetched = Vec::new();
        for source in sources {
            let kind = source.kind();
            match source.fetch(date).await {
                Ok(rows) => {
                    summary.add_records(kind, rows.len());
                    fetched.extend(rows.into_iter().map(|metrics| MetricRecord {
                        connection_id: connection.id.clone(),
                        metrics,
                        source: kind,
                        metadata: None,
                    }));
                }
                Err(SourceError::AuthRejected(reason)) => {
                    tracing::error!("Connection {} rejected: {}", connection.id, reason);
                    connections::set_status(pool, &connection.id, ConnectionStatus::NeedsReauth)
                        .await?;
                    let message = format!("{kind}: {reason}");
                    sync_tasks::mark_completed(pool, &task.id, Some(&message)).await?;
                    summary.tasks_failed += 1;
                    summary.record_error(format!("{}/{}: {}", connection.id, date, message));
                    return Ok(TaskOutcome::AuthRejected);
                }
                Err(e) => {
                    tracing::warn!("{} source failed for {} on {}: {}", kind, connection.id, date, e);
                    failures.push(format!("{kind}: {e}"));
                }
            }
        }

        let reconciled =
            reconcile_date(pool, &connection.id, date, fetched, self.config.variance_threshold).await?;
        summary.reconciled += reconciled;

        let outcome = if failures.is_empty() {
            sync_tasks::mark_completed(pool, &task.id, None).await?;
            summary.tasks_completed += 1;
            TaskOutcome::Completed
        } else if reconciled > 0 {
            let note = failures.join("; ");
            sync_tasks::mark_partial(pool, &task.id, &note).await?;
            summary.tasks_partial += 1;
            summary.record_error(format!("{}/{}: partial ({})", connection.id, date, note));
            TaskOutcome::Partial
        } else {
            let message = failures.join("; ");
            tracing::error!("Task {} failed: {}", task.id, message);
            sync_tasks::mark_completed(pool, &task.id, Some(&message)).await?;
            summary.tasks_failed += 1;
            summary.record_error(format!("{}/{}: {}", connection.id, date, message));
            TaskOutcome::Failed
        };

        if outcome != TaskOutcome::Failed {
            let verdict = validate_task(pool, &task).await?;
            if !verdict.passed {
                summary.validation_failures += 1;
            }
        }

        Ok(outcome)
    }
}

/// `days` dates ending yesterday, most recent first.
pub fn backfill_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (1..=i64::from(days))
        .map(|offset| today - Duration::days(offset))
        .collect()
}
