//! `schedule` and `recurring` command handlers.

use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::RecurringScheduler;
use crate::server::shutdown_signal;
use crate::services::{PipelineService, ScheduleRequest};
use crate::state::Stores;

pub struct ScheduleCommandHandler {
    config: Settings,
}

impl ScheduleCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, request: ScheduleRequest) -> AppResult<()> {
        let stores = Stores::connect(&self.config).await?;
        let service = PipelineService::new(stores.jobs, self.config.jobs.clone());
        let job_id = service.schedule_list(request.clone()).await?;

        println!("✓ Scheduled list scrape as job {}", job_id);
        if let Some(delay) = request.delay {
            println!("  eligible in {}s", delay.as_secs());
        }
        Ok(())
    }
}

/// Installs the cron trigger and keeps it ticking until shutdown.
pub struct RecurringCommandHandler {
    config: Settings,
}

impl RecurringCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> AppResult<()> {
        let stores = Stores::connect(&self.config).await?;
        let mut scheduler = RecurringScheduler::new(
            stores.jobs,
            self.config.schedule.clone(),
            self.config.jobs.clone(),
        )
        .await?;
        scheduler.start().await?;

        println!(
            "✓ Enqueuing {} list scrapes on '{}'; press Ctrl+C to stop",
            if self.config.schedule.dry_run { "dry-run" } else { "full" },
            self.config.schedule.cron
        );

        shutdown_signal().await;
        scheduler.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn memory_settings() -> Settings {
        let mut settings = Settings::default();
        settings.database.url = "memory:".to_string();
        settings
    }

    #[test]
    fn test_request_from_args() {
        let request = ScheduleRequest::from_args(true, Some(3), Some(60), None);
        assert!(request.dry_run);
        assert_eq!(request.limit, Some(3));
        assert_eq!(request.delay, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_schedule_against_memory_store() {
        let handler = ScheduleCommandHandler::new(memory_settings());
        handler
            .execute(ScheduleRequest::from_args(false, None, None, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_schedule_rejects_zero_limit() {
        let handler = ScheduleCommandHandler::new(memory_settings());
        let result = handler
            .execute(ScheduleRequest::from_args(false, Some(0), None, None))
            .await;
        assert!(matches!(result, Err(crate::error::AppError::Validation { .. })));
    }
}
