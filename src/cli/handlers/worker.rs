//! `worker` and `run` command handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::{
    BackoffPolicy, JobOutcome, JobRegistry, JobWorker, ProcessedJob, RecurringScheduler,
    WorkerConfig, run_workers,
};
use crate::server::shutdown_signal;
use crate::services::{PipelineService, ScheduleRequest};
use crate::state::Stores;

/// Registry with every task kind, or a startup error naming the missing one.
fn complete_registry() -> AppResult<Arc<JobRegistry>> {
    let registry = JobRegistry::with_default_tasks();
    registry.ensure_complete()?;
    Ok(Arc::new(registry))
}

pub struct WorkerCommandHandler {
    config: Settings,
}

impl WorkerCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, once: bool) -> AppResult<()> {
        let stores = Stores::connect(&self.config).await?;
        let resources = stores.task_resources(&self.config)?;
        let registry = complete_registry()?;
        let base = WorkerConfig::from_settings(&self.config);

        if once {
            let worker = JobWorker::new(stores.jobs.clone(), registry, resources, base);
            worker.sweep().await?;
            let processed = worker.drain().await?;
            print!("{}", render_processed(&processed));
            return Ok(());
        }

        let workers: Vec<JobWorker> = (0..self.config.worker.concurrency)
            .map(|i| {
                JobWorker::new(
                    stores.jobs.clone(),
                    Arc::clone(&registry),
                    Arc::clone(&resources),
                    base.for_instance(i),
                )
            })
            .collect();

        let mut scheduler = if self.config.schedule.enabled {
            let scheduler = RecurringScheduler::new(
                stores.jobs.clone(),
                self.config.schedule.clone(),
                self.config.jobs.clone(),
            )
            .await?;
            scheduler.start().await?;
            Some(scheduler)
        } else {
            None
        };

        tracing::info!(
            concurrency = workers.len(),
            worker_id = %base.worker_id,
            recurring = scheduler.is_some(),
            "Workers starting"
        );

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });

        run_workers(workers, shutdown).await;

        if let Some(scheduler) = scheduler.as_mut() {
            scheduler.shutdown().await?;
        }
        tracing::info!("Workers stopped");
        Ok(())
    }
}

/// Schedules a list scrape, then processes it and whatever it enqueues
/// until nothing is eligible.
pub struct RunCommandHandler {
    config: Settings,
}

impl RunCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, dry_run: bool, limit: Option<u32>) -> AppResult<()> {
        let stores = Stores::connect(&self.config).await?;
        let resources = stores.task_resources(&self.config)?;
        let service = PipelineService::new(stores.jobs.clone(), self.config.jobs.clone());

        let worker_config = WorkerConfig {
            backoff: BackoffPolicy::immediate(),
            ..WorkerConfig::from_settings(&self.config)
        };
        let worker = JobWorker::new(stores.jobs.clone(), complete_registry()?, resources, worker_config);

        let request = ScheduleRequest {
            dry_run,
            limit,
            ..ScheduleRequest::default()
        };
        let processed = run_pipeline(&service, &worker, request).await?;
        print!("{}", render_processed(&processed));
        Ok(())
    }
}

pub async fn run_pipeline(
    service: &PipelineService,
    worker: &JobWorker,
    request: ScheduleRequest,
) -> AppResult<Vec<ProcessedJob>> {
    let job_id = service.schedule_list(request).await?;
    tracing::info!(job_id, worker_id = worker.worker_id(), "Running pipeline in-process");
    Ok(worker.drain().await?)
}

/// One line per processed job.
pub fn render_processed(processed: &[ProcessedJob]) -> String {
    if processed.is_empty() {
        return "No eligible jobs\n".to_string();
    }

    processed
        .iter()
        .map(|p| {
            let outcome = match p.outcome {
                JobOutcome::Completed => "completed".to_string(),
                JobOutcome::Retrying { run_at } => format!("retrying at {}", run_at.to_rfc3339()),
                JobOutcome::Failed { attempts } => format!("failed after {} attempts", attempts),
                JobOutcome::LockLost => "lock lost".to_string(),
            };
            format!(
                "job {} {} (attempt {}): {}\n",
                p.job_id, p.task_identifier, p.attempt, outcome
            )
        })
        .collect()
}
