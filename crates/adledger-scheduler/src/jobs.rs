//! Job type definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobType {
    /// Capture rankings on every surface for every tracked keyword
    CaptureRankings,
    /// Create daily tasks and sync campaign metrics
    SyncMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub job_type: JobType,
    pub interval_hours: u32,
    pub next_run_at: String,
    pub last_run_at: Option<String>,
    pub enabled: bool,
}
