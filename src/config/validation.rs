//! Configuration validation logic
//!
//! Every settings section checks its own invariants; `Settings::validate`
//! returns the first failure.

use crate::config::error::ConfigError;
use crate::config::settings::{
    DatabaseConfig, FileSettings, JobsConfig, LoggerSettings, ScheduleConfig, ScraperConfig,
    ServerConfig, Settings, WorkerSettings,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Accepted database URL schemes; `memory:` selects the in-process stores
const VALID_DATABASE_SCHEMES: &[&str] = &["postgres://", "postgresql://", "memory:"];

impl ServerConfig {
    /// Validate server configuration
    ///
    /// # Validation Rules
    /// - Port must be between 1 and 65535
    /// - Request and keep-alive timeouts must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        if self.keep_alive_timeout == 0 {
            return Err(ConfigError::validation(
                "server.keep_alive_timeout",
                "Keep-alive timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty and must be a PostgreSQL or `memory:` URL
    /// - Pool bounds must be positive with min <= max
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Set PARL_DATABASE__URL to a PostgreSQL URL or `memory:`.",
            ));
        }

        if !VALID_DATABASE_SCHEMES
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err(ConfigError::validation(
                "database.url",
                format!(
                    "Invalid database URL. Expected one of: {}",
                    VALID_DATABASE_SCHEMES.join(", ")
                ),
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::validation(
                "database.min_connections",
                format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            ));
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logger.file.format",
                format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// The level may carry extra `EnvFilter` directives after a comma; only
    /// the leading level is checked here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.level.split(',').next().unwrap_or_default().trim();
        if !VALID_LOG_LEVELS.contains(&base.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logger.level",
                format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl WorkerSettings {
    /// Validate worker settings
    ///
    /// # Validation Rules
    /// - Concurrency, poll interval, task timeout and sweep interval must be positive
    /// - Per-task timeouts must name a registered task and be positive
    /// - A lock must outlive every task timeout, otherwise healthy jobs get reclaimed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(worker_id) = &self.worker_id
            && worker_id.trim().is_empty()
        {
            return Err(ConfigError::validation(
                "worker.worker_id",
                "Worker id must not be blank when provided.",
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::validation(
                "worker.concurrency",
                "Concurrency must be at least 1.",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "worker.poll_interval_ms",
                "Poll interval must be greater than 0.",
            ));
        }

        if self.task_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "worker.task_timeout_secs",
                "Task timeout must be greater than 0 seconds.",
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::validation(
                "worker.sweep_interval_secs",
                "Sweep interval must be greater than 0 seconds.",
            ));
        }

        for (task, secs) in &self.task_timeouts {
            if task.parse::<crate::jobs::TaskKind>().is_err() {
                return Err(ConfigError::validation(
                    "worker.task_timeouts",
                    format!("Unknown task identifier '{}'.", task),
                ));
            }
            if *secs == 0 {
                return Err(ConfigError::validation(
                    "worker.task_timeouts",
                    format!("Timeout for '{}' must be greater than 0 seconds.", task),
                ));
            }
        }

        let longest = self.longest_task_timeout_secs();
        if self.max_lock_age_secs <= longest {
            return Err(ConfigError::validation(
                "worker.max_lock_age_secs",
                format!(
                    "Max lock age ({}s) must exceed the longest task timeout ({}s).",
                    self.max_lock_age_secs, longest
                ),
            ));
        }

        if let Some(unknown) = self
            .task_filter
            .iter()
            .find(|task| task.parse::<crate::jobs::TaskKind>().is_err())
        {
            return Err(ConfigError::validation(
                "worker.task_filter",
                format!("Unknown task identifier '{}'.", unknown),
            ));
        }

        Ok(())
    }
}

impl JobsConfig {
    /// Validate job store and retry settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::validation(
                "jobs.max_attempts",
                "Max attempts must be at least 1.",
            ));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::validation(
                "jobs.backoff_multiplier",
                "Backoff multiplier must be a finite number >= 1.0.",
            ));
        }

        if self.backoff_max_secs < self.backoff_base_secs {
            return Err(ConfigError::validation(
                "jobs.backoff_max_secs",
                format!(
                    "Backoff cap ({}s) cannot be lower than the base delay ({}s).",
                    self.backoff_max_secs, self.backoff_base_secs
                ),
            ));
        }

        Ok(())
    }
}

impl ScraperConfig {
    /// Validate external source settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if reqwest::Url::parse(&self.list_url).is_err() {
            return Err(ConfigError::validation(
                "scraper.list_url",
                format!("'{}' is not an absolute URL.", self.list_url),
            ));
        }

        if self.dry_run_limit == 0 {
            return Err(ConfigError::validation(
                "scraper.dry_run_limit",
                "Dry-run limit must be at least 1.",
            ));
        }

        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "scraper.request_timeout_secs",
                "Request and connect timeouts must be greater than 0 seconds.",
            ));
        }

        let selectors = [
            ("scraper.selectors.member", &self.selectors.member),
            ("scraper.selectors.name", &self.selectors.name),
            ("scraper.selectors.link", &self.selectors.link),
        ];
        for (field, selector) in selectors {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::validation(
                    field,
                    format!("'{}' is not a valid CSS selector.", selector),
                ));
            }
        }

        Ok(())
    }
}

impl ScheduleConfig {
    /// Validate the recurring trigger
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = self.cron.split_whitespace().count();
        if !(5..=7).contains(&fields) {
            return Err(ConfigError::validation(
                "schedule.cron",
                format!(
                    "Cron expression '{}' must have 5 to 7 fields (seconds first when 6).",
                    self.cron
                ),
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// This method validates all sub-configurations and returns the first
    /// validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logger.validate()?;
        self.worker.validate()?;
        self.jobs.validate()?;
        self.scraper.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}
