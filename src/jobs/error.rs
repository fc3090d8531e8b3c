use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::jobs::models::JobId;

/// Failure taxonomy for the job envelope and the task bodies it runs.
///
/// Every failed attempt is recorded in `jobs.last_error` as
/// `"{kind}: {message}"` (see [`JobError::to_last_error`]).
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Source temporarily unavailable at {url} (status {}): {message}", display_status(.status))]
    TransientSource {
        url: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Source rejected request to {url} with status {status}")]
    SourceRejected { url: String, status: u16 },

    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Persistence failure during {operation}")]
    Persistence {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Stale revision for job {job_id}: expected {expected}, found {}", display_revision(.actual))]
    StaleRevision {
        job_id: JobId,
        expected: i32,
        actual: Option<i32>,
    },

    #[error("Job {job_id} exceeded its execution timeout of {seconds}s")]
    Timeout { job_id: JobId, seconds: u64 },

    #[error("No handler registered for task '{0}'")]
    UnknownTask(String),

    #[error("Invalid payload for task '{task}'")]
    InvalidPayload {
        task: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{failed} of {total} targets failed; first failure: {first}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first: Box<JobError>,
    },

    #[error("Job not found: {job_id}")]
    NotFound { job_id: JobId },

    #[error("Job {job_id} is locked by {locked_by}")]
    Locked { job_id: JobId, locked_by: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

fn display_revision(revision: &Option<i32>) -> String {
    revision.map_or_else(|| "no job".to_string(), |r| r.to_string())
}

/// Coarse classification used for retry decisions, logging and `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TransientSource,
    SourceRejected,
    Parse,
    Persistence,
    StaleRevision,
    Timeout,
    UnknownTask,
    NotFound,
    Locked,
    Scheduler,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::TransientSource => "transient_source",
            ErrorKind::SourceRejected => "source_rejected",
            ErrorKind::Parse => "parse",
            ErrorKind::Persistence => "persistence",
            ErrorKind::StaleRevision => "stale_revision",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnknownTask => "unknown_task",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Locked => "locked",
            ErrorKind::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation { .. } | JobError::InvalidPayload { .. } => ErrorKind::Validation,
            JobError::TransientSource { .. } => ErrorKind::TransientSource,
            JobError::SourceRejected { .. } => ErrorKind::SourceRejected,
            JobError::Parse { .. } => ErrorKind::Parse,
            JobError::Persistence { .. } | JobError::Database(_) => ErrorKind::Persistence,
            JobError::StaleRevision { .. } => ErrorKind::StaleRevision,
            JobError::Timeout { .. } => ErrorKind::Timeout,
            JobError::UnknownTask(_) => ErrorKind::UnknownTask,
            JobError::PartialFailure { first, .. } => first.kind(),
            JobError::NotFound { .. } => ErrorKind::NotFound,
            JobError::Locked { .. } => ErrorKind::Locked,
            JobError::Scheduler(_) => ErrorKind::Scheduler,
        }
    }

    /// Whether a handler may retry the failing operation in place before
    /// giving the attempt back to the queue.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::TransientSource { .. })
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        JobError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        JobError::Persistence {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Text stored in `jobs.last_error`, including the source chain.
    pub fn to_last_error(&self) -> String {
        let mut message = format!("{}: {}", self.kind(), self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

impl From<crate::error::AppError> for JobError {
    fn from(error: crate::error::AppError) -> Self {
        match error {
            crate::error::AppError::Job(inner) => inner,
            other => JobError::persistence("canonical store", anyhow::Error::from(other)),
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
