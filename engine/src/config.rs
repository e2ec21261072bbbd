//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default extension for exported containers.
pub const DEFAULT_CONTAINER_EXTENSION: &str = "wlsync";

/// scrypt cost parameters used to derive container keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// log2 of the CPU/memory cost
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl KdfParams {
    /// Cheap parameters for tests and benchmarks. Not for real containers.
    pub fn insecure_fast() -> Self {
        Self {
            log_n: 4,
            r: 8,
            p: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

/// Settings for a [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Recorded in snapshot metadata
    pub app_version: String,
    /// Key derivation cost for new containers
    pub kdf: KdfParams,
    /// Extension used by suggested file names
    pub container_extension: String,
}

impl SyncConfig {
    /// Builder-style setter for the key derivation cost.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Builder-style setter for the application version.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            kdf: KdfParams::default(),
            container_extension: DEFAULT_CONTAINER_EXTENSION.to_string(),
        }
    }
}
