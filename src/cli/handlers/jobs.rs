//! `status`, `cancel` and `requeue` command handlers.

use crate::api::dto::StatsResponse;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::jobs::{JobId, TaskStats};
use crate::services::PipelineService;
use crate::state::Stores;

pub struct JobCommandHandler {
    config: Settings,
}

impl JobCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    async fn service(&self) -> AppResult<PipelineService> {
        let stores = Stores::connect(&self.config).await?;
        Ok(PipelineService::new(stores.jobs, self.config.jobs.clone()))
    }

    pub async fn status(&self, json: bool) -> AppResult<()> {
        let stats = self.service().await?.stats().await?;
        if json {
            let body = serde_json::to_string_pretty(&StatsResponse::from(stats))
                .map_err(|e| AppError::Internal { source: e.into() })?;
            println!("{}", body);
        } else {
            print!("{}", render_stats(&stats));
        }
        Ok(())
    }

    pub async fn cancel(&self, job_id: JobId) -> AppResult<()> {
        self.service().await?.cancel(job_id).await?;
        println!("✓ Cancelled job {}", job_id);
        Ok(())
    }

    pub async fn requeue(&self, job_id: JobId) -> AppResult<()> {
        self.service().await?.requeue(job_id).await?;
        println!("✓ Requeued job {}", job_id);
        Ok(())
    }
}

/// Fixed-width table of per-task counts.
pub fn render_stats(stats: &[TaskStats]) -> String {
    if stats.is_empty() {
        return "No jobs in the queue\n".to_string();
    }

    let mut out = format!(
        "{:<16} {:>8} {:>8} {:>8}  {}\n",
        "TASK", "PENDING", "RUNNING", "FAILED", "LAST CREATED"
    );
    for row in stats {
        let last = row
            .last_created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<16} {:>8} {:>8} {:>8}  {}\n",
            row.task_identifier, row.pending, row.running, row.failed, last
        ));
    }
    out
}
