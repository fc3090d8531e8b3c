use std::sync::Arc;

use serde_json::json;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler as TokioCronScheduler};
use uuid::Uuid;

use crate::config::{JobsConfig, ScheduleConfig};
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::{EnqueueOptions, JobId, KeyMode};
use crate::jobs::store::JobStore;
use crate::jobs::tasks::RECURRING_LIST_KEY;
use crate::jobs::types::TaskKind;

/// Enqueue the recurring list scrape. Repeated ticks replace a prior
/// pending run instead of piling up behind it.
pub async fn enqueue_recurring_list(
    store: &dyn JobStore,
    dry_run: bool,
    config: &JobsConfig,
) -> JobResult<JobId> {
    let options = EnqueueOptions::default()
        .with_key(RECURRING_LIST_KEY)
        .with_key_mode(KeyMode::Replace)
        .with_priority(config.default_priority)
        .with_max_attempts(config.max_attempts);

    store
        .enqueue(TaskKind::ListScrape.as_str(), json!({ "dry_run": dry_run }), options)
        .await
}

/// Cron trigger that only enqueues; workers do the actual scraping.
pub struct RecurringScheduler {
    scheduler: TokioCronScheduler,
    store: Arc<dyn JobStore>,
    schedule: ScheduleConfig,
    jobs_config: JobsConfig,
}

impl RecurringScheduler {
    pub async fn new(
        store: Arc<dyn JobStore>,
        schedule: ScheduleConfig,
        jobs_config: JobsConfig,
    ) -> JobResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| JobError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            store,
            schedule,
            jobs_config,
        })
    }

    /// Install the cron entry and start ticking.
    pub async fn start(&self) -> JobResult<Uuid> {
        let store = Arc::clone(&self.store);
        let jobs_config = self.jobs_config.clone();
        let dry_run = self.schedule.dry_run;

        let cron_job = CronJob::new_async(self.schedule.cron.as_str(), move |_uuid, _lock| {
            let store = Arc::clone(&store);
            let jobs_config = jobs_config.clone();

            Box::pin(async move {
                match enqueue_recurring_list(store.as_ref(), dry_run, &jobs_config).await {
                    Ok(job_id) => {
                        tracing::info!(job_id, key = RECURRING_LIST_KEY, dry_run, "Recurring list scrape enqueued");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, key = RECURRING_LIST_KEY, "Failed to enqueue recurring list scrape");
                    }
                }
            })
        })
        .map_err(|e| JobError::validation("schedule.cron", format!("invalid cron expression: {e}")))?;

        let id = self
            .scheduler
            .add(cron_job)
            .await
            .map_err(|e| JobError::Scheduler(e.to_string()))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::Scheduler(e.to_string()))?;

        tracing::info!(cron = %self.schedule.cron, dry_run, "Recurring scheduler started");
        Ok(id)
    }

    /// Stop the scheduler gracefully
    pub async fn shutdown(&mut self) -> JobResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::Scheduler(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::MemoryJobStore;
    use crate::jobs::backoff::BackoffPolicy;
    use crate::jobs::models::JobState;

    #[tokio::test]
    async fn test_recurring_enqueue_is_idempotent() {
        let store = MemoryJobStore::default();
        let config = JobsConfig::default();

        let first = enqueue_recurring_list(&store, false, &config).await.unwrap();
        let second = enqueue_recurring_list(&store, true, &config).await.unwrap();

        assert_eq!(first, second);
        let jobs = store.snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].key.as_deref(), Some(RECURRING_LIST_KEY));
        assert_eq!(jobs[0].payload, json!({"dry_run": true}));
    }

    #[tokio::test]
    async fn test_recurring_enqueue_keeps_terminal_failure_inspectable() {
        let store = MemoryJobStore::default();
        let config = JobsConfig {
            max_attempts: 1,
            ..JobsConfig::default()
        };

        let first = enqueue_recurring_list(&store, false, &config).await.unwrap();
        let claimed = store.claim_next("w", None).await.unwrap().unwrap();
        store
            .fail(first, claimed.revision, "roster unavailable", &BackoffPolicy::immediate())
            .await
            .unwrap();

        let second = enqueue_recurring_list(&store, false, &config).await.unwrap();
        assert_ne!(first, second);

        let failed = store.get(first).await.unwrap().unwrap();
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("roster unavailable"));
        assert_eq!(store.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let schedule = ScheduleConfig {
            cron: "every morning".to_string(),
            ..ScheduleConfig::default()
        };
        let scheduler = RecurringScheduler::new(
            Arc::new(MemoryJobStore::default()),
            schedule,
            JobsConfig::default(),
        )
        .await
        .unwrap();

        assert!(matches!(scheduler.start().await, Err(JobError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut scheduler = RecurringScheduler::new(
            Arc::new(MemoryJobStore::default()),
            ScheduleConfig::default(),
            JobsConfig::default(),
        )
        .await
        .unwrap();

        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();
    }
}
