//! Dispatches a parsed command to its handler.

use super::handlers::{
    JobCommandHandler, MigrateCommandHandler, RecurringCommandHandler, RunCommandHandler,
    ScheduleCommandHandler, ServeCommandHandler, WorkerCommandHandler,
};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::services::ScheduleRequest;

pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    match &cli.command {
        Commands::Schedule {
            dry_run,
            limit,
            delay_secs,
            priority,
        } => {
            let request = ScheduleRequest::from_args(*dry_run, *limit, *delay_secs, *priority);
            ScheduleCommandHandler::new(settings).execute(request).await
        }
        Commands::Worker { once, .. } => WorkerCommandHandler::new(settings).execute(*once).await,
        Commands::Recurring { .. } => RecurringCommandHandler::new(settings).execute().await,
        Commands::Run { dry_run, limit } => {
            RunCommandHandler::new(settings).execute(*dry_run, *limit).await
        }
        Commands::Status { json } => JobCommandHandler::new(settings).status(*json).await,
        Commands::Cancel { job_id } => JobCommandHandler::new(settings).cancel(*job_id).await,
        Commands::Requeue { job_id } => JobCommandHandler::new(settings).requeue(*job_id).await,
        Commands::Serve { .. } => ServeCommandHandler::new(settings).execute().await,
        Commands::Migrate { dry_run, rollback } => {
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
    }
}
