//! Configuration settings structures for parl-pipeline
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

/// Prefix that selects the in-process stores instead of PostgreSQL.
pub const MEMORY_DATABASE_PREFIX: &str = "memory:";

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "parl-pipeline".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_keep_alive_timeout() -> u64 {
    75
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/parl-pipeline.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Status API server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Keep-alive timeout in seconds
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u64,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            keep_alive_timeout: default_keep_alive_timeout(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL, or `memory:` for the in-process stores
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.starts_with(MEMORY_DATABASE_PREFIX)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert the file representation into the runtime `LoggerConfig`.
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_config = self.console.into_console_config();
        let file_config = self.file.into_file_config()?;

        LoggerConfig::new(console_config, file_config, self.level)
            .map_err(|e| ConfigError::validation("logger".to_string(), e.to_string()))
    }
}

impl ConsoleSettings {
    pub fn into_console_config(self) -> ConsoleConfig {
        ConsoleConfig::new(self.enabled, self.colored)
    }
}

impl FileSettings {
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self.parse_format()?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format)
            .map_err(|e| ConfigError::validation("logger.file".to_string(), e.to_string()))
    }

    fn parse_format(&self) -> Result<LogFormat, ConfigError> {
        self.format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::validation("logger.file.format".to_string(), e.to_string()))
    }
}

// ============================================================================
// Worker Configuration
// ============================================================================

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_max_lock_age_secs() -> u64 {
    4_500
}

/// A full detail scrape walks every active member with a pause between
/// requests, so it gets far more time than the list scrape.
fn default_task_timeouts() -> BTreeMap<String, u64> {
    BTreeMap::from([("detail-scrape".to_string(), 3_600)])
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

/// Worker runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Explicit worker id; a random `worker-{uuid}` is generated when unset
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Number of worker loops in one process
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sleep between empty polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on one task execution
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Per-task overrides of `task_timeout_secs`, keyed by task identifier
    #[serde(default = "default_task_timeouts")]
    pub task_timeouts: BTreeMap<String, u64>,

    /// Locks older than this are considered abandoned
    #[serde(default = "default_max_lock_age_secs")]
    pub max_lock_age_secs: u64,

    /// How often a worker sweeps for expired locks
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Only claim these task identifiers; empty means all
    #[serde(default)]
    pub task_filter: Vec<String>,
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Timeout for one task identifier, falling back to `task_timeout_secs`.
    pub fn task_timeout_for(&self, task_identifier: &str) -> Duration {
        Duration::from_secs(
            self.task_timeouts
                .get(task_identifier)
                .copied()
                .unwrap_or(self.task_timeout_secs),
        )
    }

    /// Longest timeout any task may run under.
    pub fn longest_task_timeout_secs(&self) -> u64 {
        self.task_timeouts
            .values()
            .copied()
            .fold(self.task_timeout_secs, u64::max)
    }

    pub fn max_lock_age(&self) -> Duration {
        Duration::from_secs(self.max_lock_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_id: None,
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            task_timeouts: default_task_timeouts(),
            max_lock_age_secs: default_max_lock_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            task_filter: Vec::new(),
        }
    }
}

// ============================================================================
// Jobs Configuration
// ============================================================================

fn default_max_attempts() -> i32 {
    crate::jobs::models::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_secs() -> u64 {
    3_600
}

fn default_allowed_skew_secs() -> u64 {
    60
}

/// Job store and retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Attempt ceiling for newly enqueued jobs
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// First job-level retry delay
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Growth factor between consecutive retries
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap on a single retry delay
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// How far in the past `run_at` may be before enqueue rejects it
    #[serde(default = "default_allowed_skew_secs")]
    pub allowed_skew_secs: u64,

    /// Priority given to scheduled jobs (lower runs first)
    #[serde(default)]
    pub default_priority: i32,
}

impl JobsConfig {
    pub fn allowed_skew(&self) -> Duration {
        Duration::from_secs(self.allowed_skew_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max_secs: default_backoff_max_secs(),
            allowed_skew_secs: default_allowed_skew_secs(),
            default_priority: 0,
        }
    }
}

// ============================================================================
// Scraper Configuration
// ============================================================================

fn default_list_url() -> String {
    "https://www.ourcommons.ca/members/en/search".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_retry_after_secs() -> u64 {
    120
}

fn default_request_interval_ms() -> u64 {
    500
}

fn default_dry_run_limit() -> u32 {
    5
}

fn default_member_selector() -> String {
    ".ce-mip-mp-tile-container".to_string()
}

fn default_name_selector() -> String {
    ".ce-mip-mp-name".to_string()
}

fn default_party_selector() -> String {
    ".ce-mip-mp-party".to_string()
}

fn default_constituency_selector() -> String {
    ".ce-mip-mp-constituency".to_string()
}

fn default_province_selector() -> String {
    ".ce-mip-mp-province".to_string()
}

fn default_link_selector() -> String {
    "a.ce-mip-mp-tile".to_string()
}

fn default_contact_selector() -> String {
    "#contact".to_string()
}

/// CSS selectors for the roster and profile pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSettings {
    #[serde(default = "default_member_selector")]
    pub member: String,

    #[serde(default = "default_name_selector")]
    pub name: String,

    #[serde(default = "default_party_selector")]
    pub party: String,

    #[serde(default = "default_constituency_selector")]
    pub constituency: String,

    #[serde(default = "default_province_selector")]
    pub province: String,

    /// Anchor whose `href` points at the member profile
    #[serde(default = "default_link_selector")]
    pub link: String,

    /// Profile page region holding email, phone and website links
    #[serde(default = "default_contact_selector")]
    pub contact: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            member: default_member_selector(),
            name: default_name_selector(),
            party: default_party_selector(),
            constituency: default_constituency_selector(),
            province: default_province_selector(),
            link: default_link_selector(),
            contact: default_contact_selector(),
        }
    }
}

/// External source access configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Roster page URL
    #[serde(default = "default_list_url")]
    pub list_url: String,

    /// Run every scrape in dry-run mode unless overridden per job
    #[serde(default)]
    pub dry_run: bool,

    /// Members kept by a dry-run list scrape
    #[serde(default = "default_dry_run_limit")]
    pub dry_run_limit: u32,

    /// Total request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Handler-internal retries after the first request
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed delay between handler-internal retries
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on an honoured `Retry-After`
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,

    /// Pause between consecutive profile requests
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Fixed User-Agent; a random desktop one is used when unset
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub selectors: SelectorSettings,
}

impl ScraperConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            list_url: default_list_url(),
            dry_run: false,
            dry_run_limit: default_dry_run_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_after_secs: default_max_retry_after_secs(),
            request_interval_ms: default_request_interval_ms(),
            user_agent: None,
            selectors: SelectorSettings::default(),
        }
    }
}

// ============================================================================
// Schedule Configuration
// ============================================================================

fn default_cron() -> String {
    // sec min hour day month weekday
    "0 0 6 * * *".to_string()
}

/// Recurring list-scrape trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether `worker` also installs the recurring trigger
    #[serde(default)]
    pub enabled: bool,

    /// Six-field cron expression (with seconds)
    #[serde(default = "default_cron")]
    pub cron: String,

    /// Recurring runs are dry runs
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_cron(),
            dry_run: false,
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}
