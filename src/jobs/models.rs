use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::schema::jobs;

/// Store-assigned job identifier.
pub type JobId = i64;

/// Default ceiling on attempts when the caller does not provide one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

// ============================================================================
// Job rows
// ============================================================================

/// A row of the durable job table.
///
/// There is no status column: pending/running/failed are derived from the
/// lock columns and the attempt counters, and completion deletes the row.
#[derive(Debug, Clone, PartialEq, Queryable, QueryableByName, Selectable, Serialize)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Job {
    pub id: JobId,
    pub queue_id: Option<String>,
    pub task_identifier: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub key: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Exhausted its attempts and is not currently running.
    pub fn is_terminal(&self) -> bool {
        !self.is_locked() && self.attempts >= self.max_attempts
    }

    /// Whether a keyed enqueue may overwrite this job in place. Running and
    /// terminal jobs only give up their key.
    pub fn is_replaceable(&self) -> bool {
        !self.is_locked() && !self.is_terminal()
    }

    /// Whether a worker may claim this job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        !self.is_locked() && self.attempts < self.max_attempts && self.run_at <= now
    }

    pub fn state(&self) -> JobState {
        if self.is_locked() {
            JobState::Running
        } else if self.attempts >= self.max_attempts {
            JobState::Failed
        } else {
            JobState::Pending
        }
    }
}

/// Derived lifecycle state of a job that still exists in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub queue_id: Option<String>,
    pub task_identifier: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub run_at: DateTime<Utc>,
    pub max_attempts: i32,
    pub key: Option<String>,
}

// ============================================================================
// Enqueue options
// ============================================================================

/// How an enqueue with an existing idempotency key treats the prior job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Supersede the prior job: new payload, reset attempts, new `run_at`.
    ///
    /// A locked or terminal prior job is not touched beyond losing its key;
    /// that detach leaves its `revision` unchanged.
    #[default]
    Replace,
    /// Like `Replace`, but an unlocked prior job keeps its `run_at`.
    PreserveRunAt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOptions {
    pub queue_id: Option<String>,
    pub priority: i32,
    /// `None` means "now".
    pub run_at: Option<DateTime<Utc>>,
    pub max_attempts: i32,
    pub key: Option<String>,
    pub key_mode: KeyMode,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            queue_id: None,
            priority: 0,
            run_at: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            key: None,
            key_mode: KeyMode::Replace,
        }
    }
}

impl EnqueueOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_queue(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }

    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }
}

// ============================================================================
// Outcomes and stats
// ============================================================================

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailOutcome {
    /// Unlocked and rescheduled for another attempt.
    Retrying { attempts: i32, run_at: DateTime<Utc> },
    /// Attempts exhausted; the job stays in the store as failed.
    Terminal { attempts: i32 },
}

/// Per-task counts for the operator status query.
#[derive(Debug, Clone, PartialEq, Eq, QueryableByName, Serialize)]
pub struct TaskStats {
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub task_identifier: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub pending: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub running: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub failed: i64,
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Timestamptz>)]
    pub last_created_at: Option<DateTime<Utc>>,
}
