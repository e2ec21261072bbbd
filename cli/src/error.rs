//! Unified error handling for the CLI.

use std::path::PathBuf;

use crate::config::ConfigError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] worklog_sync::Error),

    #[error("Store error: {0}")]
    Store(#[from] worklog_sync::StoreError),

    #[error("Cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No password given; pass --password or set WORKLOG_SYNC_PASSWORD")]
    MissingPassword,
}

impl CliError {
    /// Wrap an IO error with the path it concerns.
    pub fn file(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CliError::File { path, source }
    }
}

/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, CliError>;
