//! Errors raised while locating, reading and checking settings.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required configuration file is missing: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Configuration path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("{first} and {second} cannot both be set")]
    ConflictingSources {
        first: &'static str,
        second: &'static str,
    },

    #[error("Unknown environment '{0}' (expected development, test, staging or production)")]
    UnknownEnvironment(String),

    /// A source could be read but its keys do not fit [`Settings`](crate::config::Settings).
    #[error("Configuration does not match the settings layout: {0}")]
    Layout(#[source] config::ConfigError),

    #[error("Invalid {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Cannot read configuration sources: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted settings key at fault, for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }
}
