pub mod jobs;
pub mod scheduler;

pub use jobs::{JobType, ScheduledJob};
pub use scheduler::{due_jobs, is_job_due, next_run_timestamp};
