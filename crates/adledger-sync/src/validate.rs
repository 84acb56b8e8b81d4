//! Post-reconciliation sanity checks.

use crate::error::Result;
use adledger_core::{CampaignMetrics, SourceKind};
use adledger_db::metric_records;
use adledger_db::sync_tasks::SyncTask;
use adledger_db::validation_results;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

pub const NOT_EMPTY: &str = "not_empty";
pub const NO_NEGATIVE_SPEND: &str = "no_negative_spend";
pub const REALISTIC_CTR: &str = "realistic_ctr";

/// A click-through rate at or above this is treated as bogus data.
pub const MAX_REALISTIC_CTR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub checks: BTreeMap<String, bool>,
    pub note: String,
}

/// Run every check over a day's reconciled records.
pub fn evaluate(records: &[CampaignMetrics]) -> Verdict {
    let negative: Vec<&str> = records
        .iter()
        .filter(|r| r.values.spend < 0.0)
        .map(|r| r.campaign_id.as_str())
        .collect();
    let unrealistic: Vec<&str> = records
        .iter()
        .filter(|r| r.values.ctr().is_some_and(|ctr| ctr >= MAX_REALISTIC_CTR))
        .map(|r| r.campaign_id.as_str())
        .collect();

    let checks = BTreeMap::from([
        (NOT_EMPTY.to_string(), !records.is_empty()),
        (NO_NEGATIVE_SPEND.to_string(), negative.is_empty()),
        (REALISTIC_CTR.to_string(), unrealistic.is_empty()),
    ]);
    let passed = checks.values().all(|ok| *ok);

    let mut problems = Vec::new();
    if records.is_empty() {
        problems.push("no reconciled records".to_string());
    }
    if !negative.is_empty() {
        problems.push(format!("negative spend: {}", negative.join(", ")));
    }
    if !unrealistic.is_empty() {
        problems.push(format!("ctr >= 50%: {}", unrealistic.join(", ")));
    }
    let note = if passed {
        format!("all checks passed ({} records)", records.len())
    } else {
        problems.join("; ")
    };

    Verdict {
        passed,
        checks,
        note,
    }
}

/// Validate the reconciled records of a task's connection and day, and
/// store the verdict. A failing verdict is reported, never raised.
pub async fn validate_task(pool: &SqlitePool, task: &SyncTask) -> Result<Verdict> {
    let records = metric_records::list_for_date_by_source(
        pool,
        &task.connection_id,
        task.target_date,
        SourceKind::Reconciled,
    )
    .await?;
    let metrics: Vec<CampaignMetrics> = records.into_iter().map(|r| r.metrics).collect();

    let verdict = evaluate(&metrics);
    validation_results::upsert(pool, &task.id, verdict.passed, &verdict.checks, Some(&verdict.note))
        .await?;

    if verdict.passed {
        tracing::debug!("Task {} passed validation", task.id);
    } else {
        tracing::warn!("Task {} failed validation: {}", task.id, verdict.note);
    }
    Ok(verdict)
}
