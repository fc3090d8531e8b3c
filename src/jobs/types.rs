use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::{JobsConfig, ScraperConfig};
use crate::external::SourceFetcher;
use crate::external::parliament::PageParser;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::JobId;
use crate::jobs::store::JobStore;
use crate::repositories::MemberStore;

/// The closed set of task identifiers a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    ListScrape,
    DetailScrape,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::ListScrape, TaskKind::DetailScrape];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ListScrape => "list-scrape",
            TaskKind::DetailScrape => "detail-scrape",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| JobError::UnknownTask(s.to_string()))
    }
}

/// Shared handles a task body needs. Built once in the entry point.
pub struct TaskResources {
    pub jobs: Arc<dyn JobStore>,
    pub members: Arc<dyn MemberStore>,
    pub source: Arc<dyn SourceFetcher>,
    pub parser: PageParser,
    pub scraper: ScraperConfig,
    pub jobs_config: JobsConfig,
}

impl TaskResources {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        members: Arc<dyn MemberStore>,
        source: Arc<dyn SourceFetcher>,
        scraper: ScraperConfig,
        jobs_config: JobsConfig,
    ) -> JobResult<Self> {
        let parser = PageParser::new(&scraper.selectors)?;
        Ok(Self {
            jobs,
            members,
            source,
            parser,
            scraper,
            jobs_config,
        })
    }
}

/// Job execution context passed to tasks
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub task_identifier: String,
    /// 1-based; the claim already counted this attempt.
    pub attempt: i32,
    pub max_attempts: i32,
    pub worker_id: String,
    pub resources: Arc<TaskResources>,
}

/// Successful task result, recorded in the worker's completion log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutput {
    pub data: JsonValue,
    pub source_url: Option<String>,
}

impl TaskOutput {
    pub fn new(data: JsonValue) -> Self {
        Self {
            data,
            source_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

pub type TaskResult = JobResult<TaskOutput>;

/// Trait that all job tasks must implement
#[async_trait]
pub trait JobTask: Send + Sync + fmt::Debug {
    fn task_kind() -> TaskKind
    where
        Self: Sized;

    async fn execute(&self, ctx: JobContext) -> TaskResult;

    /// Optional description
    fn description(&self) -> Option<String> {
        None
    }
}
