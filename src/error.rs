//! Error types for bcachectl
//!
//! All modules use `BcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bcachectl operations
pub type BcacheResult<T> = Result<T, BcacheError>;

/// All errors that can occur in bcachectl
#[derive(Error, Debug)]
pub enum BcacheError {
    // Environment errors
    #[error("bcache is not loaded: {0} does not exist")]
    ModuleNotLoaded(PathBuf),

    #[error("bcachectl commands require root privileges")]
    NotRoot,

    // Scan errors
    #[error("Failed to enumerate {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not resolve {device}: {reason}")]
    Resolution { device: String, reason: String },

    // Lookup errors
    #[error("{0} does not appear to be a registered bcache device")]
    NotRegistered(String),

    #[error("{0} does not appear to be a formatted and registered BACKING device")]
    NotBacking(String),

    #[error("{0} does not appear to be a formatted and registered CACHE device")]
    NotCache(String),

    #[error("{backing} is not attached to cache set {cache_set}")]
    NotAttached { backing: String, cache_set: String },

    // Validation errors
    #[error("Tunable not in allowed list: {0}")]
    TunableNotAllowed(String),

    #[error("Tunable path does not exist on this kernel: {path}")]
    TunableUnavailable { path: PathBuf },

    #[error("Invalid value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },

    // Control file errors
    #[error("Failed to write {path}: {source}")]
    ControlWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ControlRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Confirmation errors
    #[error("{device} did not appear at {path} after {attempts} checks")]
    ConfirmationTimeout {
        device: String,
        path: PathBuf,
        attempts: u32,
    },

    #[error("Interrupted while waiting for {0}")]
    Interrupted(String),

    #[error("Cache set {expected} could not be attached to {backing} (now attached to: {found})")]
    AttachMismatch {
        backing: String,
        expected: String,
        found: String,
    },

    // Flush errors
    #[error("Failed to flush {0} device(s): {1}")]
    FlushFailed(usize, String),

    #[error("Failed to tune {0} device(s): {1}")]
    TuneFailed(usize, String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // External tool errors
    #[error("{0} already carries a bcache superblock")]
    AlreadyFormatted(String),

    #[error("{0} carries an existing non-bcache superblock")]
    ForeignSuperblock(String),

    #[error("{0} is busy")]
    DeviceBusy(String),

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, output: {output}")]
    CommandExecution { command: String, output: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl BcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Whether the error is a validation failure raised before any write
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::TunableNotAllowed(_) | Self::TunableUnavailable { .. } | Self::InvalidValue { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ModuleNotLoaded(_) => Some("Check the module with: lsmod | grep bcache, then: modprobe bcache"),
            Self::NotRoot => Some("Re-run with sudo"),
            Self::ConfirmationTimeout { .. } => Some(
                "If the device has an associated cache device, try registering the cache device instead",
            ),
            Self::AttachMismatch { .. } => {
                Some("Is there already a cache set associated with the device? Detach it first")
            }
            Self::TunableNotAllowed(_) => Some("Run: bcachectl tune --help for the allowed tunables"),
            Self::AlreadyFormatted(_) | Self::ForeignSuperblock(_) => Some(
                "Make sure the device is not registered (bcachectl unregister <device>) and use --wipe-super (erases ANY superblock and filesystem!)",
            ),
            Self::DeviceBusy(_) => Some("Is it already a registered bcache device or mounted?"),
            _ => None,
        }
    }
}
