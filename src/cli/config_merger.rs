//! Merges CLI overrides into the file-based configuration.
//!
//! Precedence, lowest first: config files, `PARL_*` environment variables,
//! CLI flags.

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, settings::Settings};

pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Load the unvalidated base configuration selected by `--config` and
    /// `--env`; validation runs after the overrides are applied.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::new()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = cli.env {
            loader = loader.with_environment(env.into());
        }

        Ok(Self::new(loader.load_unvalidated()?))
    }

    /// Apply CLI overrides and validate the result.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        if cli.verbose {
            config.logger.level = "debug".to_string();
        } else if cli.quiet {
            config.logger.level = "error".to_string();
        }

        Self::apply_command_overrides(&mut config, &cli.command);

        config.validate()?;
        Ok(config)
    }

    fn apply_command_overrides(config: &mut Settings, command: &Commands) {
        match command {
            Commands::Worker {
                worker_id,
                concurrency,
                poll_interval_ms,
                once: _,
            } => {
                if let Some(id) = worker_id {
                    config.worker.worker_id = Some(id.clone());
                }
                if let Some(n) = concurrency {
                    config.worker.concurrency = *n;
                }
                if let Some(ms) = poll_interval_ms {
                    config.worker.poll_interval_ms = *ms;
                }
            }
            Commands::Recurring { cron, dry_run } => {
                if let Some(expr) = cron {
                    config.schedule.cron = expr.clone();
                }
                if *dry_run {
                    config.schedule.dry_run = true;
                }
            }
            Commands::Serve { host, port } => {
                if let Some(host_addr) = host {
                    config.server.host = host_addr.clone();
                }
                if let Some(port_num) = port {
                    config.server.port = *port_num;
                }
            }
            Commands::Schedule { .. }
            | Commands::Run { .. }
            | Commands::Status { .. }
            | Commands::Cancel { .. }
            | Commands::Requeue { .. }
            | Commands::Migrate { .. } => {}
        }
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}
