//! Operator-facing pipeline operations shared by the CLI and the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::config::JobsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::tasks::ListScrapeTask;
use crate::jobs::{
    EnqueueOptions, Job, JobError, JobId, JobStore, TaskKind, TaskStats, enqueue_recurring_list,
    store::to_chrono,
};

/// An on-demand list scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleRequest {
    pub dry_run: bool,
    pub limit: Option<u32>,
    /// Delay before the job becomes eligible
    pub delay: Option<Duration>,
    /// Overrides `jobs.default_priority`
    pub priority: Option<i32>,
}

impl ScheduleRequest {
    /// Request from CLI flags; `delay_secs` becomes `delay`.
    pub fn from_args(
        dry_run: bool,
        limit: Option<u32>,
        delay_secs: Option<u64>,
        priority: Option<i32>,
    ) -> Self {
        Self {
            dry_run,
            limit,
            delay: delay_secs.map(Duration::from_secs),
            priority,
        }
    }
}

#[derive(Clone)]
pub struct PipelineService {
    jobs: Arc<dyn JobStore>,
    config: JobsConfig,
}

impl PipelineService {
    pub fn new(jobs: Arc<dyn JobStore>, config: JobsConfig) -> Self {
        Self { jobs, config }
    }

    /// Enqueue a list scrape now (or after `delay`).
    pub async fn schedule_list(&self, request: ScheduleRequest) -> AppResult<JobId> {
        let task = ListScrapeTask {
            dry_run: request.dry_run,
            limit: request.limit,
        };
        task.validate().map_err(|e| AppError::Validation {
            field: "limit".to_string(),
            reason: e.to_string(),
        })?;
        let payload: JsonValue = serde_json::to_value(&task).map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;

        let mut options = EnqueueOptions::default()
            .with_priority(request.priority.unwrap_or(self.config.default_priority))
            .with_max_attempts(self.config.max_attempts);
        if let Some(delay) = request.delay {
            options = options.with_run_at(Utc::now() + to_chrono(delay));
        }

        let job_id = self
            .jobs
            .enqueue(TaskKind::ListScrape.as_str(), payload, options)
            .await?;
        tracing::info!(job_id, dry_run = request.dry_run, limit = ?request.limit, "List scrape scheduled");
        Ok(job_id)
    }

    /// Enqueue the keyed recurring list scrape once.
    pub async fn schedule_recurring(&self, dry_run: bool) -> AppResult<JobId> {
        Ok(enqueue_recurring_list(self.jobs.as_ref(), dry_run, &self.config).await?)
    }

    pub async fn stats(&self) -> AppResult<Vec<TaskStats>> {
        Ok(self.jobs.stats().await?)
    }

    pub async fn get_job(&self, job_id: JobId) -> AppResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(AppError::Job(JobError::NotFound { job_id }))
    }

    pub async fn cancel(&self, job_id: JobId) -> AppResult<()> {
        self.jobs.cancel(job_id).await?;
        tracing::info!(job_id, "Job cancelled");
        Ok(())
    }

    pub async fn requeue(&self, job_id: JobId) -> AppResult<()> {
        self.jobs.requeue(job_id).await?;
        tracing::info!(job_id, "Job requeued");
        Ok(())
    }
}
