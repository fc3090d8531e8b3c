//! Job status DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::jobs::{Job, JobId, JobState, TaskStats};

/// A job as reported to operators.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub task_identifier: String,
    pub state: JobState,
    pub queue_id: Option<String>,
    pub payload: JsonValue,
    pub priority: i32,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub key: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            state: job.state(),
            id: job.id,
            task_identifier: job.task_identifier,
            queue_id: job.queue_id,
            payload: job.payload,
            priority: job.priority,
            run_at: job.run_at,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            key: job.key,
            locked_at: job.locked_at,
            locked_by: job.locked_by,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Per-task counts plus totals across tasks.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub tasks: Vec<TaskStats>,
    pub pending: i64,
    pub running: i64,
    pub failed: i64,
}

impl From<Vec<TaskStats>> for StatsResponse {
    fn from(tasks: Vec<TaskStats>) -> Self {
        Self {
            pending: tasks.iter().map(|t| t.pending).sum(),
            running: tasks.iter().map(|t| t.running).sum(),
            failed: tasks.iter().map(|t| t.failed).sum(),
            tasks,
        }
    }
}
