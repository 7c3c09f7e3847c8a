//! Configuration schema for bcachectl
//!
//! Configuration is stored at `/etc/bcachectl/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Filesystem roots
    pub paths: PathsConfig,

    /// Confirmation polling bounds
    pub timing: TimingConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Refuse to run unless the effective uid is 0
    pub require_root: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            require_root: true,
        }
    }
}

/// Where the device nodes and the kernel's sysfs trees live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Device node directory scanned for `bcacheN`
    pub dev_dir: PathBuf,

    /// `major:minor` symlink directory
    pub dev_block_dir: PathBuf,

    /// Block device sysfs root
    pub sys_block_dir: PathBuf,

    /// bcache sysfs root (cache sets and the register trigger)
    pub sys_bcache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new("/"))
    }
}

impl PathsConfig {
    /// The standard layout below an arbitrary root directory
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            dev_dir: root.join("dev"),
            dev_block_dir: root.join("dev/block"),
            sys_block_dir: root.join("sys/block"),
            sys_bcache_dir: root.join("sys/fs/bcache"),
        }
    }
}

/// Polling bounds for operations whose effect the kernel applies asynchronously
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between two checks
    pub poll_interval_ms: u64,

    /// Checks for a freshly registered device to appear
    pub register_polls: u32,

    /// Checks for a stopped or detached device to disappear
    pub stop_polls: u32,

    /// Checks of `state` while draining dirty data
    pub flush_polls: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            register_polls: 3,
            stop_polls: 5,
            flush_polls: 30,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// External programs invoked for on-disk operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub make_bcache: String,
    pub wipefs: String,
    pub super_show: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            make_bcache: "make-bcache".to_string(),
            wipefs: "wipefs".to_string(),
            super_show: "bcache-super-show".to_string(),
        }
    }
}
