//! Aggregated outcome of one orchestration run.

use adledger_core::{RankPlatform, SourceKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts per source and a bounded list of error strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub connections: usize,
    pub tasks_created: usize,
    pub tasks_reset: usize,
    pub tasks_capped: usize,
    /// Tasks found running past their lease and failed
    pub tasks_recovered: usize,
    pub tasks_completed: usize,
    pub tasks_partial: usize,
    pub tasks_failed: usize,
    /// Observations written per surface
    pub rank_observations: BTreeMap<RankPlatform, usize>,
    /// Records written per metric source
    pub metric_records: BTreeMap<SourceKind, usize>,
    pub reconciled: usize,
    pub validation_failures: usize,
    pub errors: Vec<String>,
    /// Errors beyond the bound, counted but not kept
    pub errors_dropped: usize,
    #[serde(skip)]
    max_errors: usize,
}

impl RunSummary {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            ..Self::default()
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        if self.errors.len() < self.max_errors {
            self.errors.push(error.into());
        } else {
            self.errors_dropped += 1;
        }
    }

    pub fn add_observations(&mut self, platform: RankPlatform, count: usize) {
        *self.rank_observations.entry(platform).or_default() += count;
    }

    pub fn add_records(&mut self, source: SourceKind, count: usize) {
        *self.metric_records.entry(source).or_default() += count;
    }

    pub fn error_count(&self) -> usize {
        self.errors.len() + self.errors_dropped
    }
}
