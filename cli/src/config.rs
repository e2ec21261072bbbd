//! Configuration management for the CLI.

use std::env;
use std::path::PathBuf;
use worklog_sync::{KdfParams, SyncConfig};

/// CLI configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the JSON record store
    pub data_dir: PathBuf,
    /// scrypt cost (log2) for new containers
    pub kdf_log_n: u8,
    /// Container password, if set in the environment
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var("WORKLOG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./worklog-data"));

        let kdf_log_n = match env::var("WORKLOG_KDF_LOG_N") {
            Ok(raw) => parse_log_n(&raw)?,
            Err(_) => KdfParams::default().log_n,
        };

        let password = env::var("WORKLOG_SYNC_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        Ok(Self {
            data_dir,
            kdf_log_n,
            password,
        })
    }

    /// Engine settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        let kdf = KdfParams {
            log_n: self.kdf_log_n,
            ..KdfParams::default()
        };
        SyncConfig::default().with_kdf(kdf)
    }
}

fn parse_log_n(raw: &str) -> Result<u8, ConfigError> {
    match raw.trim().parse::<u8>() {
        Ok(n) if (10..=20).contains(&n) => Ok(n),
        _ => Err(ConfigError::InvalidKdfCost(raw.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("WORKLOG_KDF_LOG_N must be an integer between 10 and 20, got '{0}'")]
    InvalidKdfCost(String),
}
