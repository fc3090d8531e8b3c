use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::{EnqueueOptions, FailOutcome, Job, JobId, TaskStats};

/// Durable job table. The single source of truth for scheduling.
///
/// Every change of ownership or schedule bumps `revision`. `complete` and
/// `fail` must be given the revision returned by `claim_next` and reject the
/// call with [`JobError::StaleRevision`] when the row moved on, for example
/// after its lock expired and another worker reclaimed it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, or supersede the job holding the same key.
    async fn enqueue(
        &self,
        task_identifier: &str,
        payload: JsonValue,
        options: EnqueueOptions,
    ) -> JobResult<JobId>;

    /// Atomically lock the most urgent eligible job for `worker_id`.
    async fn claim_next(
        &self,
        worker_id: &str,
        task_filter: Option<&[String]>,
    ) -> JobResult<Option<Job>>;

    /// Delete a successfully processed job.
    async fn complete(&self, job_id: JobId, revision: i32) -> JobResult<()>;

    /// Record a failed attempt and either reschedule or retire the job.
    async fn fail(
        &self,
        job_id: JobId,
        revision: i32,
        error: &str,
        backoff: &BackoffPolicy,
    ) -> JobResult<FailOutcome>;

    /// Unlock jobs whose lock is older than `max_lock_age`. Attempts are kept.
    async fn release_expired_locks(&self, max_lock_age: Duration) -> JobResult<u64>;

    async fn get(&self, job_id: JobId) -> JobResult<Option<Job>>;

    async fn stats(&self) -> JobResult<Vec<TaskStats>>;

    /// Remove a job that is not currently running.
    async fn cancel(&self, job_id: JobId) -> JobResult<()>;

    /// Make a failed (or pending) job claimable again with a fresh attempt budget.
    async fn requeue(&self, job_id: JobId) -> JobResult<()>;
}

/// Shared enqueue validation for every store implementation.
pub(crate) fn validate_enqueue(
    task_identifier: &str,
    options: &EnqueueOptions,
    now: DateTime<Utc>,
    allowed_skew: chrono::Duration,
) -> JobResult<()> {
    if task_identifier.trim().is_empty() {
        return Err(JobError::validation(
            "task_identifier",
            "must not be empty",
        ));
    }

    if options.max_attempts < 1 {
        return Err(JobError::validation(
            "max_attempts",
            format!("must be at least 1, got {}", options.max_attempts),
        ));
    }

    if let Some(key) = &options.key
        && key.trim().is_empty()
    {
        return Err(JobError::validation("key", "must not be blank when provided"));
    }

    if let Some(queue_id) = &options.queue_id
        && queue_id.trim().is_empty()
    {
        return Err(JobError::validation("queue_id", "must not be blank when provided"));
    }

    let earliest = now.checked_sub_signed(allowed_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
    if let Some(run_at) = options.run_at
        && run_at < earliest
    {
        return Err(JobError::validation(
            "run_at",
            format!(
                "{} is more than {}s in the past",
                run_at.to_rfc3339(),
                allowed_skew.num_seconds()
            ),
        ));
    }

    Ok(())
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
