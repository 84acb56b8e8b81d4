//! AdLedger application shell.
//!
//! Loads configuration, opens the database and polls the scheduled jobs
//! once a minute. Pipeline logic lives in the `crates/` directory.

use adledger_browser::{BrowserEngine, PageFetcher};
use adledger_core::{AppConfig, ScheduleConfig};
use adledger_db::Database;
use adledger_scheduler::{due_jobs, next_run_timestamp, JobType};
use adledger_scraper::{AdScraper, PlaceScraper, ReportScraper, ViewScraper};
use adledger_sync::{PlatformSources, RankingSources, SyncOrchestrator};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,adledger=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Keep the stored job intervals in line with the configuration.
async fn apply_schedule(db: &Database, schedule: &ScheduleConfig) -> anyhow::Result<()> {
    for job in db.get_scheduled_jobs().await? {
        let hours = match job.job_type {
            JobType::CaptureRankings => schedule.rank_interval_hours,
            JobType::SyncMetrics => schedule.metrics_interval_hours,
        };
        if job.interval_hours != hours {
            info!("Job {} interval {}h -> {}h", job.id, job.interval_hours, hours);
            db.set_job_interval(&job.id, hours).await?;
        }
    }
    Ok(())
}

/// Run every due job once and book its next run.
async fn poll_jobs(db: &Database, orchestrator: &SyncOrchestrator) -> anyhow::Result<()> {
    let jobs = db.get_scheduled_jobs().await?;
    let now = chrono::Utc::now().to_rfc3339();

    for job in due_jobs(&jobs, &now) {
        info!("Running scheduled job {} ({:?})", job.id, job.job_type);
        let outcome = match job.job_type {
            JobType::CaptureRankings => orchestrator.capture_rankings().await,
            JobType::SyncMetrics => orchestrator.run(None, None).await,
        };
        if let Err(e) = outcome {
            error!("Scheduled job {} failed: {}", job.id, e);
        }

        db.update_job_next_run(&job.id, &next_run_timestamp(job.interval_hours), &now)
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting AdLedger v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env().context("failed to load configuration")?;
    let db_path = config.database_path()?;
    let db = Database::new(&db_path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.run_migrations().await?;
    info!("Database ready at {} (schema v{})", db_path.display(), db.get_schema_version().await?);
    apply_schedule(&db, &config.schedule).await?;

    let fetcher: Arc<dyn PageFetcher> = Arc::new(BrowserEngine::new(config.browser.clone()));
    let rankings = RankingSources {
        place: Arc::new(PlaceScraper::new(Arc::clone(&fetcher), &config.scraping)),
        view: Arc::new(ViewScraper::new(Arc::clone(&fetcher), &config.scraping)),
        ad: Arc::new(AdScraper::new(Arc::clone(&fetcher), &config.scraping)),
    };
    let report = Arc::new(ReportScraper::new(Arc::clone(&fetcher), &config.scraping));
    let sources = PlatformSources::new(config.searchad.clone(), Some(report));
    let orchestrator = SyncOrchestrator::new(db.clone(), rankings, Arc::new(sources), config.sync.clone());

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poll_jobs(&db, &orchestrator).await {
                    error!("Job poll failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    db.close().await;
    Ok(())
}
