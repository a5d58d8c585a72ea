pub mod core;
pub mod error;
pub mod jobs;
pub mod tasks;

pub use core::ReminderScheduler;
pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{job_id, JobHandler, JobKind, ReminderJob};
