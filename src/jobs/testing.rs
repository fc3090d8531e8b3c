//! In-memory pipeline fixtures shared by the job tests.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::{JobsConfig, ScraperConfig};
use crate::external::testing::ScriptedSource;
use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::memory_store::MemoryJobStore;
use crate::jobs::models::{EnqueueOptions, FailOutcome, Job, JobId, TaskStats};
use crate::jobs::store::JobStore;
use crate::jobs::types::{JobContext, TaskResources};
use crate::models::RosterEntry;
use crate::repositories::MemoryMemberRepository;

/// Scraper settings with millisecond pauses so retry paths stay fast.
pub fn test_scraper_config() -> ScraperConfig {
    ScraperConfig {
        retry_count: 2,
        retry_delay_ms: 1,
        request_interval_ms: 0,
        ..ScraperConfig::default()
    }
}

pub fn roster_entries(ids: RangeInclusive<u32>) -> Vec<RosterEntry> {
    ids.map(|id| RosterEntry {
        source_id: id.to_string(),
        full_name: format!("Member {id}"),
        party: None,
        constituency: None,
        province: Some("Ontario".to_string()),
        profile_url: format!("https://www.ourcommons.ca/members/en/member-{id}({id})"),
    })
    .collect()
}

pub struct TestPipeline {
    pub jobs: Arc<MemoryJobStore>,
    pub members: Arc<MemoryMemberRepository>,
    pub source: Arc<ScriptedSource>,
    pub scraper: ScraperConfig,
    failing_enqueue: bool,
}

impl TestPipeline {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            jobs: Arc::new(MemoryJobStore::default()),
            members: Arc::new(MemoryMemberRepository::new()),
            source: Arc::new(source),
            scraper: test_scraper_config(),
            failing_enqueue: false,
        }
    }

    /// Every enqueue through [`TestPipeline::job_store`] fails.
    pub fn with_failing_enqueue(mut self) -> Self {
        self.failing_enqueue = true;
        self
    }

    pub fn job_store(&self) -> Arc<dyn JobStore> {
        if self.failing_enqueue {
            Arc::new(FailingEnqueueStore {
                inner: self.jobs.clone(),
            })
        } else {
            self.jobs.clone()
        }
    }

    pub fn resources(&self) -> Arc<TaskResources> {
        Arc::new(
            TaskResources::new(
                self.job_store(),
                self.members.clone(),
                self.source.clone(),
                self.scraper.clone(),
                JobsConfig::default(),
            )
            .unwrap(),
        )
    }
}

pub fn context_with(job_id: JobId, pipeline: &TestPipeline) -> JobContext {
    JobContext {
        job_id,
        task_identifier: "list-scrape".to_string(),
        attempt: 1,
        max_attempts: 5,
        worker_id: "test-worker".to_string(),
        resources: pipeline.resources(),
    }
}

/// Context whose job store is `store` and whose other resources are empty.
pub fn context(job_id: JobId, store: Arc<dyn JobStore>) -> JobContext {
    let pipeline = TestPipeline::new(ScriptedSource::new());
    let resources = TaskResources::new(
        store,
        pipeline.members.clone(),
        pipeline.source.clone(),
        pipeline.scraper.clone(),
        JobsConfig::default(),
    )
    .unwrap();

    JobContext {
        resources: Arc::new(resources),
        ..context_with(job_id, &pipeline)
    }
}

/// Delegates to a memory store but rejects every enqueue.
#[derive(Default)]
pub struct FailingEnqueueStore {
    inner: Arc<MemoryJobStore>,
}

#[async_trait]
impl JobStore for FailingEnqueueStore {
    async fn enqueue(&self, _: &str, _: JsonValue, _: EnqueueOptions) -> JobResult<JobId> {
        Err(JobError::persistence(
            "enqueue job",
            anyhow::anyhow!("connection refused"),
        ))
    }

    async fn claim_next(&self, worker_id: &str, filter: Option<&[String]>) -> JobResult<Option<Job>> {
        self.inner.claim_next(worker_id, filter).await
    }

    async fn complete(&self, job_id: JobId, revision: i32) -> JobResult<()> {
        self.inner.complete(job_id, revision).await
    }

    async fn fail(
        &self,
        job_id: JobId,
        revision: i32,
        error: &str,
        backoff: &BackoffPolicy,
    ) -> JobResult<FailOutcome> {
        self.inner.fail(job_id, revision, error, backoff).await
    }

    async fn release_expired_locks(&self, max_lock_age: Duration) -> JobResult<u64> {
        self.inner.release_expired_locks(max_lock_age).await
    }

    async fn get(&self, job_id: JobId) -> JobResult<Option<Job>> {
        self.inner.get(job_id).await
    }

    async fn stats(&self) -> JobResult<Vec<TaskStats>> {
        self.inner.stats().await
    }

    async fn cancel(&self, job_id: JobId) -> JobResult<()> {
        self.inner.cancel(job_id).await
    }

    async fn requeue(&self, job_id: JobId) -> JobResult<()> {
        self.inner.requeue(job_id).await
    }
}
