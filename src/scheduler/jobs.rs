//! Job definitions for the per-incident reminder subsystem

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};

/// The two per-incident reminder kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CommsReminder,
    RoleWatcher,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::CommsReminder, JobKind::RoleWatcher];
}

/// Deterministic job id: `{slug}_{kind}`. At most one live job exists per
/// (incident, kind).
pub fn job_id(slug: &str, kind: JobKind) -> String {
    format!("{}_{}", slug, kind)
}

/// Work a reminder job performs on each fire. Failures are logged by the
/// scheduler and never reschedule or crash it.
pub type JobHandler =
    Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

/// Metadata about one scheduled reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    /// `{slug}_{kind}`
    pub id: String,

    pub slug: String,

    pub kind: JobKind,

    /// Fire interval
    pub interval: Duration,

    pub enabled: bool,

    pub created_at: DateTime<Utc>,

    pub last_run: Option<DateTime<Utc>>,

    pub run_count: u64,
}

impl ReminderJob {
    pub fn new(slug: impl Into<String>, kind: JobKind, interval: Duration) -> Self {
        let slug = slug.into();
        Self {
            id: job_id(&slug, kind),
            slug,
            kind,
            interval,
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
        }
    }
}
