//! Two-stage ordering: a detail scrape is only enqueued once a list scrape
//! has fully succeeded.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::JobsConfig;
use crate::jobs::models::{EnqueueOptions, JobId, KeyMode};
use crate::jobs::store::JobStore;
use crate::jobs::tasks::DetailScrapeTask;
use crate::jobs::types::{JobContext, TaskKind};

/// Key of the cron-installed list scrape.
pub const RECURRING_LIST_KEY: &str = "list-scrape:recurring";

/// Conceptual pipeline position, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    ListRunning,
    ListSucceeded,
    ListFailed,
    DetailEnqueued,
    DetailRunning,
    DetailSucceeded,
    DetailFailed,
}

impl PipelineStage {
    pub fn running(kind: TaskKind) -> Self {
        match kind {
            TaskKind::ListScrape => PipelineStage::ListRunning,
            TaskKind::DetailScrape => PipelineStage::DetailRunning,
        }
    }

    pub fn finished(kind: TaskKind, succeeded: bool) -> Self {
        match (kind, succeeded) {
            (TaskKind::ListScrape, true) => PipelineStage::ListSucceeded,
            (TaskKind::ListScrape, false) => PipelineStage::ListFailed,
            (TaskKind::DetailScrape, true) => PipelineStage::DetailSucceeded,
            (TaskKind::DetailScrape, false) => PipelineStage::DetailFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::ListRunning => "list_running",
            PipelineStage::ListSucceeded => "list_succeeded",
            PipelineStage::ListFailed => "list_failed",
            PipelineStage::DetailEnqueued => "detail_enqueued",
            PipelineStage::DetailRunning => "detail_running",
            PipelineStage::DetailSucceeded => "detail_succeeded",
            PipelineStage::DetailFailed => "detail_failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scheduling the dependent detail scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequencingReport {
    Enqueued { job_id: JobId, key: String },
    Failed { key: String, error: String },
}

impl SequencingReport {
    pub fn enqueued_job_id(&self) -> Option<JobId> {
        match self {
            SequencingReport::Enqueued { job_id, .. } => Some(*job_id),
            SequencingReport::Failed { .. } => None,
        }
    }
}

pub fn detail_key_for(list_job_id: JobId) -> String {
    format!("{}:after-list:{list_job_id}", TaskKind::DetailScrape)
}

pub struct SequencingCoordinator {
    jobs: Arc<dyn JobStore>,
    config: JobsConfig,
}

impl SequencingCoordinator {
    pub fn new(jobs: Arc<dyn JobStore>, config: JobsConfig) -> Self {
        Self { jobs, config }
    }

    /// Enqueue the detail scrape for a list job that just succeeded.
    ///
    /// Never fails: an enqueue error is logged and returned in the report so
    /// the list job still completes.
    pub async fn after_list_success(
        &self,
        ctx: &JobContext,
        member_ids: Option<Vec<String>>,
        dry_run: bool,
    ) -> SequencingReport {
        let key = detail_key_for(ctx.job_id);
        let targets = member_ids.as_ref().map(Vec::len);
        let task = DetailScrapeTask { member_ids, dry_run };

        let payload = match serde_json::to_value(&task) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(list_job_id = ctx.job_id, key = %key, error = %e, "Failed to encode detail scrape payload");
                return SequencingReport::Failed {
                    key,
                    error: e.to_string(),
                };
            }
        };

        let options = EnqueueOptions::default()
            .with_key(key.clone())
            .with_key_mode(KeyMode::Replace)
            .with_priority(self.config.default_priority)
            .with_max_attempts(self.config.max_attempts);

        match self
            .jobs
            .enqueue(TaskKind::DetailScrape.as_str(), payload, options)
            .await
        {
            Ok(job_id) => {
                tracing::info!(
                    list_job_id = ctx.job_id,
                    detail_job_id = job_id,
                    key = %key,
                    targets = ?targets,
                    stage = %PipelineStage::DetailEnqueued,
                    "Detail scrape enqueued"
                );
                SequencingReport::Enqueued { job_id, key }
            }
            Err(e) => {
                tracing::error!(
                    list_job_id = ctx.job_id,
                    key = %key,
                    error = %e,
                    "Failed to enqueue detail scrape after successful list scrape"
                );
                SequencingReport::Failed {
                    key,
                    error: e.to_last_error(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{FailingEnqueueStore, context};
    use crate::jobs::{JobStore, MemoryJobStore};

    #[tokio::test]
    async fn test_enqueues_detail_with_list_key() {
        let store = Arc::new(MemoryJobStore::default());
        let ctx = context(42, store.clone());
        let coordinator = SequencingCoordinator::new(store.clone(), JobsConfig::default());

        let report = coordinator
            .after_list_success(&ctx, Some(vec!["1".to_string()]), true)
            .await;

        let job_id = report.enqueued_job_id().unwrap();
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.task_identifier, "detail-scrape");
        assert_eq!(job.key.as_deref(), Some("detail-scrape:after-list:42"));
        assert_eq!(job.payload["member_ids"], serde_json::json!(["1"]));
        assert_eq!(job.payload["dry_run"], serde_json::json!(true));
        assert!(job.run_at <= chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_repeated_success_replaces_instead_of_duplicating() {
        let store = Arc::new(MemoryJobStore::default());
        let ctx = context(7, store.clone());
        let coordinator = SequencingCoordinator::new(store.clone(), JobsConfig::default());

        let first = coordinator.after_list_success(&ctx, None, false).await;
        let second = coordinator.after_list_success(&ctx, None, false).await;

        assert_eq!(first.enqueued_job_id(), second.enqueued_job_id());
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported_not_raised() {
        let store: Arc<dyn JobStore> = Arc::new(FailingEnqueueStore::default());
        let ctx = context(3, store.clone());
        let coordinator = SequencingCoordinator::new(store, JobsConfig::default());

        let report = coordinator.after_list_success(&ctx, None, false).await;

        match report {
            SequencingReport::Failed { key, error } => {
                assert_eq!(key, "detail-scrape:after-list:3");
                assert!(error.starts_with("persistence:"));
            }
            other => panic!("expected failure report, got {other:?}"),
        }
    }

    #[test]
    fn test_detail_key_is_distinct_from_recurring_key() {
        assert_ne!(detail_key_for(1), RECURRING_LIST_KEY);
        assert_ne!(detail_key_for(1), "detail-scrape:recurring");
    }

    #[test]
    fn test_stage_transitions() {
        assert_eq!(PipelineStage::running(TaskKind::ListScrape), PipelineStage::ListRunning);
        assert_eq!(
            PipelineStage::finished(TaskKind::DetailScrape, false),
            PipelineStage::DetailFailed
        );
        assert_eq!(PipelineStage::Idle.to_string(), "idle");
    }
}
