//! AdLedger Sync - acquisition-and-reconciliation pipeline.
//!
//! Ties the scrapers and the platform API client to the database:
//!
//! - Per-day sync tasks (`pending → running → {completed | failed | partial}`)
//! - Rank capture per keyword, Place and View concurrently, then Ad
//! - Reconciliation of API and scraped report figures (API wins)
//! - Validation of the reconciled day
//! - A bounded run summary handed to a [`Notifier`]
//!
//! # Example
//!
//! ```rust,ignore
//! use adledger_sync::{SyncOrchestrator, RankingSources, PlatformSources};
//!
//! let orchestrator = SyncOrchestrator::new(db, rankings, Arc::new(sources), config.sync);
//! let summary = orchestrator.run(None, None).await?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod guard;
pub mod notify;
pub mod orchestrator;
pub mod persist;
pub mod reconcile;
pub mod sources;
pub mod summary;
pub mod validate;

// Re-export commonly used types
pub use error::{Result, SyncError};
pub use guard::{InFlightGuard, InFlightPermit, ScrapeKey};
pub use notify::{Notifier, TracingNotifier};
pub use orchestrator::{backfill_dates, RankingSources, SyncOrchestrator, TaskOutcome};
pub use persist::persist_rankings;
pub use reconcile::{reconcile_date, reconcile_group, resolve_campaign_ids, Provenance, Reconciled};
pub use sources::{
    MetricSource, MetricSourceProvider, PlatformSources, ReportSource, SearchAdSource, SourceError,
};
pub use summary::RunSummary;
pub use validate::{evaluate, validate_task, Verdict};
