//! Configuration management for bcachectl

pub mod profile;
pub mod schema;

pub use profile::TuningProfile;
pub use schema::Config;

use crate::error::{BcacheError, BcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    explicit: bool,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            explicit: false,
        }
    }

    /// Create a config manager with a custom path, which must exist
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            explicit: true,
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("/etc/bcachectl/config.toml")
    }

    /// Load configuration, using defaults when the default file is absent
    pub async fn load(&self) -> BcacheResult<Config> {
        if !self.config_path.exists() {
            if self.explicit {
                return Err(BcacheError::ConfigNotFound(self.config_path.clone()));
            }
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BcacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BcacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| BcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let manager = ConfigManager {
            config_path: PathBuf::from("/nonexistent/bcachectl.toml"),
            explicit: false,
        };

        let config = manager.load().await.unwrap();
        assert_eq!(config.general.log_format, "text");
    }

    #[tokio::test]
    async fn explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("nonexistent.toml"));

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, BcacheError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn load_from_file_reports_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[timing]\npoll_interval_ms = \"soon\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, BcacheError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn load_from_file_reads_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[general]\nrequire_root = false\n").unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert!(!config.general.require_root);
    }
}
