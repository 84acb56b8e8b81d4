//! Hand-off of run summaries to the outside world.

use crate::summary::RunSummary;

/// Errors shown inline in a notification.
pub const NOTIFY_ERROR_LIMIT: usize = 5;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary);
}

/// Writes the summary as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, summary: &RunSummary) {
        let shown: Vec<&str> = summary
            .errors
            .iter()
            .take(NOTIFY_ERROR_LIMIT)
            .map(String::as_str)
            .collect();
        let rankings = serde_json::to_string(&summary.rank_observations).unwrap_or_default();
        let metrics = serde_json::to_string(&summary.metric_records).unwrap_or_default();

        tracing::info!(
            connections = summary.connections,
            completed = summary.tasks_completed,
            partial = summary.tasks_partial,
            recovered = summary.tasks_recovered,
            failed = summary.tasks_failed,
            reconciled = summary.reconciled,
            validation_failures = summary.validation_failures,
            rankings = %rankings,
            metrics = %metrics,
            errors = summary.error_count(),
            "Sync run finished"
        );
        if !shown.is_empty() {
            tracing::warn!("First errors: {}", shown.join(" | "));
        }
    }
}
