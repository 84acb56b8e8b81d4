//! Job scheduling: decides when queued jobs are due.

use crate::jobs::ScheduledJob;
use chrono::DateTime;

/// Returns true if `next_run_at` is in the past relative to `now`.
///
/// Unparseable timestamps are never due.
pub fn is_job_due(next_run_at: &str, now: &str) -> bool {
    let next = DateTime::parse_from_rfc3339(next_run_at).ok();
    let current = DateTime::parse_from_rfc3339(now).ok();
    match (next, current) {
        (Some(n), Some(c)) => n <= c,
        _ => {
            tracing::debug!("Ignoring unparseable schedule time {:?}", next_run_at);
            false
        }
    }
}

/// Return the RFC 3339 timestamp for `now + interval_hours`.
pub fn next_run_timestamp(interval_hours: u32) -> String {
    use chrono::Utc;
    let next = Utc::now() + chrono::Duration::hours(i64::from(interval_hours));
    next.to_rfc3339()
}

/// Enabled jobs whose next run is at or before `now`.
pub fn due_jobs<'a>(jobs: &'a [ScheduledJob], now: &str) -> Vec<&'a ScheduledJob> {
    jobs.iter()
        .filter(|job| job.enabled && is_job_due(&job.next_run_at, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobType;

    fn job(id: &str, next_run_at: &str, enabled: bool) -> ScheduledJob {
        ScheduledJob {
            id: id.to_string(),
            job_type: JobType::SyncMetrics,
            interval_hours: 24,
            next_run_at: next_run_at.to_string(),
            last_run_at: None,
            enabled,
        }
    }

    #[test]
    fn test_job_is_due_past_next_run() {
        let now = "2026-02-17T12:00:00Z".to_string();
        let next_run = "2026-02-17T11:00:00Z".to_string();
        assert!(is_job_due(&next_run, &now));
    }

    #[test]
    fn test_job_not_due_future_next_run() {
        let now = "2026-02-17T12:00:00Z".to_string();
        let next_run = "2026-02-17T13:00:00Z".to_string();
        assert!(!is_job_due(&next_run, &now));
    }

    #[test]
    fn test_unparseable_time_not_due() {
        assert!(!is_job_due("2026-02-17 11:00:00", "2026-02-17T12:00:00Z"));
    }

    #[test]
    fn test_next_run_is_interval_ahead() {
        let before = chrono::Utc::now();
        let next = DateTime::parse_from_rfc3339(&next_run_timestamp(24)).unwrap();
        let delta = next.signed_duration_since(before);
        assert!(delta >= chrono::Duration::hours(24));
        assert!(delta < chrono::Duration::hours(24) + chrono::Duration::minutes(1));
    }

    #[test]
    fn test_due_jobs_skips_disabled_and_future() {
        let jobs = vec![
            job("due", "2026-02-17T11:00:00Z", true),
            job("disabled", "2026-02-17T11:00:00Z", false),
            job("future", "2026-02-17T13:00:00Z", true),
        ];

        let due = due_jobs(&jobs, "2026-02-17T12:00:00Z");
        let ids: Vec<_> = due.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["due"]);
    }
}
