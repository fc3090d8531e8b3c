//! Poll-claim-dispatch loop.
//!
//! Workers coordinate only through the job store: any number of them, in one
//! process or many, may share a store. A worker that crashes mid-job leaves
//! its lock behind until some worker's sweep releases it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Settings;
use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::{FailOutcome, Job, JobId};
use crate::jobs::registry::JobRegistry;
use crate::jobs::store::JobStore;
use crate::jobs::tasks::PipelineStage;
use crate::jobs::types::{JobContext, TaskKind, TaskResources, TaskResult};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Default bound on one execution
    pub task_timeout: Duration,
    /// Per-task overrides of `task_timeout`
    pub task_timeouts: HashMap<String, Duration>,
    pub max_lock_age: Duration,
    pub sweep_interval: Duration,
    pub task_filter: Option<Vec<String>>,
    pub backoff: BackoffPolicy,
}

impl WorkerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let worker = &settings.worker;
        Self {
            worker_id: worker.worker_id.clone().unwrap_or_else(default_worker_id),
            poll_interval: worker.poll_interval(),
            task_timeout: worker.task_timeout(),
            task_timeouts: worker
                .task_timeouts
                .keys()
                .map(|task| (task.clone(), worker.task_timeout_for(task)))
                .collect(),
            max_lock_age: worker.max_lock_age(),
            sweep_interval: worker.sweep_interval(),
            task_filter: (!worker.task_filter.is_empty()).then(|| worker.task_filter.clone()),
            backoff: BackoffPolicy::from(&settings.jobs),
        }
    }

    pub fn timeout_for(&self, task_identifier: &str) -> Duration {
        self.task_timeouts
            .get(task_identifier)
            .copied()
            .unwrap_or(self.task_timeout)
    }

    /// Copy of this config for the `index`-th worker of a group.
    pub fn for_instance(&self, index: usize) -> Self {
        Self {
            worker_id: format!("{}-{index}", self.worker_id),
            ..self.clone()
        }
    }
}

/// `worker-{pid}-{random}`; unique enough to attribute locks.
pub fn default_worker_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}-{}", std::process::id(), &suffix[..8])
}

/// What happened to a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Retrying { run_at: DateTime<Utc> },
    Failed { attempts: i32 },
    /// The job's revision moved on while it ran, typically because the lock
    /// expired and another worker reclaimed it.
    LockLost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedJob {
    pub job_id: JobId,
    pub task_identifier: String,
    pub attempt: i32,
    pub outcome: JobOutcome,
}

pub struct JobWorker {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    resources: Arc<TaskResources>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<JobRegistry>,
        resources: Arc<TaskResources>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            resources,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Poll until `shutdown` is cancelled. A job already running is finished
    /// (or timed out) before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(worker_id = %self.config.worker_id, "Worker started");
        let mut last_sweep: Option<Instant> = None;

        while !shutdown.is_cancelled() {
            if last_sweep.is_none_or(|at| at.elapsed() >= self.config.sweep_interval) {
                if let Err(e) = self.sweep().await {
                    tracing::error!(worker_id = %self.config.worker_id, error = %e, "Lock sweep failed");
                }
                last_sweep = Some(Instant::now());
            }

            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(worker_id = %self.config.worker_id, error = %e, "Worker iteration failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Worker stopped");
    }

    /// Release locks older than the configured maximum age.
    pub async fn sweep(&self) -> JobResult<u64> {
        let released = self.store.release_expired_locks(self.config.max_lock_age).await?;
        if released > 0 {
            tracing::warn!(
                worker_id = %self.config.worker_id,
                released,
                max_lock_age_secs = self.config.max_lock_age.as_secs(),
                "Released expired job locks"
            );
        }
        Ok(released)
    }

    /// Claim and process at most one job.
    pub async fn run_once(&self) -> JobResult<Option<ProcessedJob>> {
        let filter = self.config.task_filter.as_deref();
        let Some(job) = self.store.claim_next(&self.config.worker_id, filter).await? else {
            return Ok(None);
        };

        let span = tracing::info_span!(
            "job",
            job_id = job.id,
            task = %job.task_identifier,
            attempt = job.attempts,
            worker_id = %self.config.worker_id,
        );
        self.process(job).instrument(span).await.map(Some)
    }

    /// Process jobs until none is eligible.
    pub async fn drain(&self) -> JobResult<Vec<ProcessedJob>> {
        let mut processed = Vec::new();
        while let Some(job) = self.run_once().await? {
            processed.push(job);
        }
        Ok(processed)
    }

    async fn process(&self, job: Job) -> JobResult<ProcessedJob> {
        let kind = job.task_identifier.parse::<TaskKind>().ok();
        if let Some(kind) = kind {
            tracing::info!(stage = %PipelineStage::running(kind), "Job claimed");
        }

        let started = Instant::now();
        let result = self.execute(&job).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(output) => {
                tracing::info!(
                    elapsed_ms,
                    stage = kind.map(|k| PipelineStage::finished(k, true).as_str()),
                    source_url = output.source_url.as_deref(),
                    data = %output.data,
                    "Job succeeded"
                );
                match self.store.complete(job.id, job.revision).await {
                    Ok(()) => JobOutcome::Completed,
                    Err(e @ JobError::StaleRevision { .. }) => self.lock_lost(&e),
                    Err(e) => return Err(e),
                }
            }
            Err(error) => {
                tracing::warn!(
                    elapsed_ms,
                    stage = kind.map(|k| PipelineStage::finished(k, false).as_str()),
                    error_kind = %error.kind(),
                    error = %error,
                    "Job attempt failed"
                );
                let message = error.to_last_error();
                match self
                    .store
                    .fail(job.id, job.revision, &message, &self.config.backoff)
                    .await
                {
                    Ok(FailOutcome::Retrying { attempts, run_at }) => {
                        tracing::info!(attempts, max_attempts = job.max_attempts, run_at = %run_at, "Job scheduled for retry");
                        JobOutcome::Retrying { run_at }
                    }
                    Ok(FailOutcome::Terminal { attempts }) => {
                        tracing::error!(attempts, last_error = %message, "Job failed permanently");
                        JobOutcome::Failed { attempts }
                    }
                    Err(e @ JobError::StaleRevision { .. }) => self.lock_lost(&e),
                    Err(e) => return Err(e),
                }
            }
        };

        Ok(ProcessedJob {
            job_id: job.id,
            task_identifier: job.task_identifier,
            attempt: job.attempts,
            outcome,
        })
    }

    async fn execute(&self, job: &Job) -> TaskResult {
        let task = self
            .registry
            .create_task(&job.task_identifier, job.payload.clone())?;

        let ctx = JobContext {
            job_id: job.id,
            task_identifier: job.task_identifier.clone(),
            attempt: job.attempts,
            max_attempts: job.max_attempts,
            worker_id: self.config.worker_id.clone(),
            resources: self.resources.clone(),
        };

        let limit = self.config.timeout_for(&job.task_identifier);
        match timeout(limit, task.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout {
                job_id: job.id,
                seconds: limit.as_secs(),
            }),
        }
    }

    fn lock_lost(&self, error: &JobError) -> JobOutcome {
        tracing::error!(error = %error, "Lock violation: job changed hands while running");
        JobOutcome::LockLost
    }
}

/// Run `workers` side by side until `shutdown` is cancelled.
pub async fn run_workers(workers: Vec<JobWorker>, shutdown: CancellationToken) {
    futures::future::join_all(workers.iter().map(|worker| worker.run(shutdown.clone()))).await;
}
