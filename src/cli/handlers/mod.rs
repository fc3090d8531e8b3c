//! Command handlers, one per CLI concern.

pub mod jobs;
pub mod migrate;
pub mod schedule;
pub mod serve;
pub mod worker;

pub use jobs::JobCommandHandler;
pub use migrate::MigrateCommandHandler;
pub use schedule::{RecurringCommandHandler, ScheduleCommandHandler};
pub use serve::ServeCommandHandler;
pub use worker::{RunCommandHandler, WorkerCommandHandler};
