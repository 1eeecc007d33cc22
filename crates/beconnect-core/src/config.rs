use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CacheError, Result};

/// Number of most-recently-fetched alerts kept by a prune.
pub const DEFAULT_RETENTION_COUNT: usize = 20;

/// Top-level configuration for the alert cache.
///
/// Loaded from `~/.beconnect/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl CacheConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CacheConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.retention_count == 0 {
            return Err(CacheError::Config(
                "storage.retention_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Full path of the database file (`data_dir` joined with `db_file`,
    /// with a leading `~` expanded to the home directory).
    pub fn db_path(&self) -> PathBuf {
        resolve_data_dir(&self.general.data_dir).join(&self.storage.db_file)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir
        .strip_prefix("~/")
        .or_else(|| data_dir.strip_prefix("~\\"))
    {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the database file.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.beconnect/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Storage and retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name inside `data_dir`.
    pub db_file: String,
    /// Alerts kept by a prune, and the maximum size of a live snapshot.
    pub retention_count: usize,
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Run a checkpoint and VACUUM after clearing all alerts.
    pub compact_on_clear: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "beconnect.db".to_string(),
            retention_count: DEFAULT_RETENTION_COUNT,
            busy_timeout_ms: 5000,
            compact_on_clear: true,
        }
    }
}
