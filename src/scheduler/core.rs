//! Reminder scheduler service.
//!
//! An explicitly constructed service with a `start()`/`shutdown()`
//! lifecycle, passed to the lifecycle engine by reference. Wraps
//! tokio-cron-scheduler with a registry keyed by the deterministic
//! `{slug}_{kind}` id; scheduling an existing id replaces it rather than
//! duplicating.

use super::{
    error::{SchedulerError, SchedulerResult},
    jobs::{job_id, JobHandler, JobKind, ReminderJob},
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct JobEntry {
    job: ReminderJob,
    handle: Uuid,
    handler: JobHandler,
}

/// Timer service for per-incident reminder jobs, independent of the
/// request-handling path. Each fire is at-least-once with no automatic
/// retry; a handler failure is logged and does not unschedule the job.
pub struct ReminderScheduler {
    scheduler: JobScheduler,
    jobs: Arc<DashMap<String, JobEntry>>,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl ReminderScheduler {
    pub async fn new() -> SchedulerResult<Self> {
        info!("Initializing reminder scheduler");

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        Ok(Self {
            scheduler,
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(tokio::sync::RwLock::new(false)),
        })
    }

    /// Start the timer pool
    pub async fn start(&mut self) -> SchedulerResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Reminder scheduler is already running");
                return Ok(());
            }
            *running = true;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        info!("Reminder scheduler started");
        Ok(())
    }

    /// Stop the timer pool
    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Reminder scheduler is not running");
                return Ok(());
            }
            *running = false;
        }

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::ShutdownFailed(e.to_string()))?;

        info!("Reminder scheduler shut down");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Schedule a reminder with replace semantics: an existing job under
    /// the same `{slug}_{kind}` id is updated, never duplicated.
    pub async fn schedule(
        &self,
        slug: &str,
        kind: JobKind,
        interval: Duration,
        handler: JobHandler,
    ) -> SchedulerResult<String> {
        let id = job_id(slug, kind);

        if let Some((_, existing)) = self.jobs.remove(&id) {
            debug!(job_id = %id, "Replacing existing job");
            if let Err(e) = self.scheduler.remove(&existing.handle).await {
                warn!(job_id = %id, error = %e, "Failed to remove replaced job from timer pool");
            }
        }

        let handle = self.register(&id, interval, handler.clone()).await?;

        self.jobs.insert(
            id.clone(),
            JobEntry {
                job: ReminderJob::new(slug, kind, interval),
                handle,
                handler,
            },
        );

        info!(job_id = %id, interval_secs = interval.as_secs(), "Job scheduled");
        Ok(id)
    }

    /// Move an existing job to a new interval, keeping its run statistics
    pub async fn reschedule(&self, job_id: &str, new_interval: Duration) -> SchedulerResult<()> {
        let (handler, old_handle) = {
            let entry = self
                .jobs
                .get(job_id)
                .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
            (entry.handler.clone(), entry.handle)
        };

        if let Err(e) = self.scheduler.remove(&old_handle).await {
            warn!(job_id = %job_id, error = %e, "Failed to remove job from timer pool");
        }

        let handle = self.register(job_id, new_interval, handler).await?;

        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        entry.handle = handle;
        entry.job.interval = new_interval;

        info!(
            job_id = %job_id,
            interval_secs = new_interval.as_secs(),
            "Job rescheduled"
        );
        Ok(())
    }

    /// Cancel a job and stop its timer
    pub async fn cancel(&self, job_id: &str) -> SchedulerResult<()> {
        let (_, entry) = self
            .jobs
            .remove(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        self.scheduler
            .remove(&entry.handle)
            .await
            .map_err(|e| SchedulerError::JobRemovalFailed(e.to_string()))?;

        info!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    /// Cancel every reminder kind for one incident; failures are logged
    /// and non-fatal so resolution always completes
    pub async fn cancel_incident_jobs(&self, slug: &str) {
        for kind in JobKind::ALL {
            let id = job_id(slug, kind);
            match self.cancel(&id).await {
                Ok(()) => {}
                Err(SchedulerError::JobNotFound(_)) => {}
                Err(e) => {
                    error!(job_id = %id, error = %e, "Failed to cancel job at resolution");
                }
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<ReminderJob> {
        self.jobs.get(job_id).map(|entry| entry.job.clone())
    }

    pub fn list(&self) -> Vec<ReminderJob> {
        self.jobs.iter().map(|entry| entry.job.clone()).collect()
    }

    /// Register the handler with the underlying timer pool
    async fn register(
        &self,
        id: &str,
        interval: Duration,
        handler: JobHandler,
    ) -> SchedulerResult<Uuid> {
        let id = id.to_string();
        let jobs = self.jobs.clone();

        let cron_job = tokio_cron_scheduler::Job::new_repeated_async(interval, move |_uuid, _l| {
            let handler = handler.clone();
            let jobs = jobs.clone();
            let id = id.clone();

            Box::pin(async move {
                debug!(job_id = %id, "Executing reminder job");

                let result = handler().await;

                if let Some(mut entry) = jobs.get_mut(&id) {
                    entry.job.run_count += 1;
                    entry.job.last_run = Some(Utc::now());
                }

                match result {
                    Ok(()) => {
                        debug!(job_id = %id, "Reminder job completed");
                    }
                    Err(e) => {
                        error!(job_id = %id, error = %e, "Reminder job failed");
                    }
                }
            })
        })
        .map_err(|e: JobSchedulerError| SchedulerError::JobCreationFailed(e.to_string()))?;

        self.scheduler
            .add(cron_job)
            .await
            .map_err(|e| SchedulerError::JobCreationFailed(e.to_string()))
    }
}
