//! CLI argument parsing with clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::jobs::JobId;

/// Durable scrape pipeline for the parliamentary member roster
#[derive(Parser, Debug)]
#[command(name = "parl-pipeline")]
#[command(about = "Durable job queue and scraper for the parliamentary member roster")]
#[command(long_about = "
parl-pipeline keeps a canonical store of parliamentary members up to date.
A list scrape reads the roster and, when it succeeds, schedules a detail
scrape of each member's profile. Jobs live in a durable queue and are run
by one or more workers.

EXAMPLES:
    # Schedule a five-member dry run and process it in this process
    parl-pipeline run --dry-run

    # Schedule a full list scrape for the workers
    parl-pipeline schedule

    # Run four workers that also enqueue the daily recurring scrape
    parl-pipeline worker --concurrency 4

    # Show pending, running and failed counts per task
    parl-pipeline status

    # Apply database migrations
    parl-pipeline migrate
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    ///
    /// Loads only this TOML file (plus PARL_* environment overrides) instead
    /// of the layered files under config/.
    #[arg(short, long, global = true, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Available values: development (dev), production (prod), staging, test
    #[arg(short, long, global = true, value_enum)]
    pub env: Option<Environment>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Schedule a list scrape now
    ///
    /// Examples:
    ///   parl-pipeline schedule                      # full run
    ///   parl-pipeline schedule --dry-run --limit 3  # three members only
    ///   parl-pipeline schedule --delay-secs 600     # eligible in ten minutes
    Schedule {
        /// Scrape without deactivating members missing from the roster
        #[arg(long)]
        dry_run: bool,

        /// Keep only the first N roster members (1-1000)
        #[arg(long, value_name = "N", value_parser = super::validation::validate_limit)]
        limit: Option<u32>,

        /// Seconds before the job becomes eligible
        #[arg(long, value_name = "SECONDS")]
        delay_secs: Option<u64>,

        /// Lower runs first; defaults to jobs.default_priority
        #[arg(long, value_name = "PRIORITY", allow_negative_numbers = true)]
        priority: Option<i32>,
    },

    /// Run workers until interrupted
    ///
    /// When schedule.enabled is set the recurring list scrape is enqueued
    /// from this process as well.
    Worker {
        /// Worker id recorded on claimed jobs; instances get a -N suffix
        #[arg(long, value_name = "ID")]
        worker_id: Option<String>,

        /// Number of workers in this process
        #[arg(long, value_name = "N", value_parser = super::validation::validate_concurrency)]
        concurrency: Option<usize>,

        /// Idle poll interval in milliseconds
        #[arg(long, value_name = "MS")]
        poll_interval_ms: Option<u64>,

        /// Process every eligible job once, then exit
        #[arg(long)]
        once: bool,
    },

    /// Enqueue the list scrape on a cron schedule until interrupted
    Recurring {
        /// Six-field cron expression (sec min hour day month weekday)
        #[arg(long, value_name = "EXPR")]
        cron: Option<String>,

        /// Schedule dry runs
        #[arg(long)]
        dry_run: bool,
    },

    /// Schedule a list scrape and process it, and the detail scrape it
    /// schedules, in this process
    Run {
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_name = "N", value_parser = super::validation::validate_limit)]
        limit: Option<u32>,
    },

    /// Show pending, running and failed counts per task
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete an unlocked job
    Cancel {
        #[arg(value_name = "JOB_ID")]
        job_id: JobId,
    },

    /// Make a failed job claimable again
    Requeue {
        #[arg(value_name = "JOB_ID")]
        job_id: JobId,
    },

    /// Serve the read-only status API
    Serve {
        /// Default: server.host
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Default: server.port
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,
    },

    /// Database migration operations
    ///
    /// Examples:
    ///   parl-pipeline migrate                    # Apply all pending migrations
    ///   parl-pipeline migrate --dry-run          # Show pending migrations without applying
    ///   parl-pipeline migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1-100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "staging")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["parl-pipeline", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["parl-pipeline"]).is_err());
    }

    #[test]
    fn test_schedule_command() {
        let cli = Cli::try_parse_from([
            "parl-pipeline",
            "schedule",
            "--dry-run",
            "--limit",
            "3",
            "--priority",
            "-5",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Commands::Schedule {
                dry_run: true,
                limit: Some(3),
                delay_secs: None,
                priority: Some(-5),
            }
        );
    }

    #[test]
    fn test_limit_out_of_range() {
        assert!(Cli::try_parse_from(["parl-pipeline", "run", "--limit", "0"]).is_err());
        assert!(Cli::try_parse_from(["parl-pipeline", "run", "--limit", "1001"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["parl-pipeline", "status", "--json", "-v", "--env", "prod"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.env, Some(Environment::Production));
        assert_eq!(cli.command, Commands::Status { json: true });
    }

    #[test]
    fn test_job_id_arguments() {
        let cli = Cli::try_parse_from(["parl-pipeline", "requeue", "42"]).unwrap();
        assert_eq!(cli.command, Commands::Requeue { job_id: 42 });
        assert!(Cli::try_parse_from(["parl-pipeline", "cancel", "abc"]).is_err());
    }

    #[test]
    fn test_conflicting_verbose_quiet() {
        let err = Cli::try_parse_from(["parl-pipeline", "-v", "-q", "status"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_migrate_conflicts() {
        assert!(Cli::try_parse_from(["parl-pipeline", "migrate", "--dry-run", "--rollback", "1"]).is_err());
    }
}
