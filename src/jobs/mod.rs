//! Durable job queue, task handlers and the worker runtime.

pub mod backoff;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod tasks;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::BackoffPolicy;
pub use error::{ErrorKind, JobError, JobResult};
pub use memory_store::MemoryJobStore;
pub use models::{EnqueueOptions, FailOutcome, Job, JobId, JobState, KeyMode, TaskStats};
pub use pg_store::PgJobStore;
pub use registry::JobRegistry;
pub use scheduler::{RecurringScheduler, enqueue_recurring_list};
pub use store::JobStore;
pub use types::{JobContext, JobTask, TaskKind, TaskOutput, TaskResources, TaskResult};
pub use worker::{JobOutcome, JobWorker, ProcessedJob, WorkerConfig, run_workers};
