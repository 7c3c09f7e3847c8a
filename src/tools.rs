//! External bcache-tools invocations
//!
//! The on-disk side of bcache (formatting, wiping, reading superblocks) is
//! only reachable through userspace programs. [`BcacheTools`] is the seam
//! so tests can stand in for them.

use crate::config::schema::ToolsConfig;
use crate::error::{BcacheError, BcacheResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Combined stdout/stderr of a finished tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

/// Devices to format with `make-bcache`
#[derive(Debug, Clone, Default)]
pub struct FormatRequest {
    pub backing: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    /// Stop, `wipefs -a`, and pass `--wipe-bcache`
    pub wipe: bool,
    pub writeback: bool,
}

impl FormatRequest {
    /// `make-bcache` arguments, cache device first
    pub fn make_bcache_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(cache) = &self.cache {
            args.push("-C".to_string());
            args.push(cache.to_string_lossy().into_owned());
        }
        if let Some(backing) = &self.backing {
            args.push("-B".to_string());
            args.push(backing.to_string_lossy().into_owned());
        }
        if self.wipe {
            args.push("--wipe-bcache".to_string());
        }
        if self.writeback {
            args.push("--writeback".to_string());
        }
        args
    }

    /// Devices in the request, cache first
    pub fn devices(&self) -> Vec<&Path> {
        self.cache
            .iter()
            .chain(self.backing.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Userspace programs operating on on-disk bcache metadata
#[async_trait]
pub trait BcacheTools: Send + Sync {
    /// Dump the superblock of a raw device as text (`bcache-super-show`)
    async fn super_show(&self, device: &Path) -> BcacheResult<String>;

    /// Format devices (`make-bcache`)
    async fn make_bcache(&self, request: &FormatRequest) -> BcacheResult<ToolOutput>;

    /// Erase every signature on a device (`wipefs -a`)
    async fn wipefs(&self, device: &Path) -> BcacheResult<ToolOutput>;
}

/// Runs the real programs
pub struct SystemTools {
    config: ToolsConfig,
}

impl SystemTools {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    /// Execute a program and collect its output
    async fn exec(&self, program: &str, args: &[String]) -> BcacheResult<ToolOutput> {
        debug!("Executing: {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BcacheError::command_failed(format!("{} {:?}", program, args), e))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ToolOutput {
            success: output.status.success(),
            output: text,
        })
    }
}

#[async_trait]
impl BcacheTools for SystemTools {
    async fn super_show(&self, device: &Path) -> BcacheResult<String> {
        let args = [device.to_string_lossy().into_owned()];
        let result = self.exec(&self.config.super_show, &args).await?;

        if result.success {
            Ok(result.output)
        } else {
            Err(BcacheError::command_exec(
                format!("{} {}", self.config.super_show, device.display()),
                result.output,
            ))
        }
    }

    async fn make_bcache(&self, request: &FormatRequest) -> BcacheResult<ToolOutput> {
        self.exec(&self.config.make_bcache, &request.make_bcache_args())
            .await
    }

    async fn wipefs(&self, device: &Path) -> BcacheResult<ToolOutput> {
        let args = ["-a".to_string(), device.to_string_lossy().into_owned()];
        self.exec(&self.config.wipefs, &args).await
    }
}

/// Extract `cset.uuid` from `bcache-super-show` output
pub fn parse_cset_uuid(superblock: &str) -> Option<Uuid> {
    superblock.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("cset.uuid")?;
        let value = rest.split_whitespace().next()?;
        Uuid::parse_str(value).ok()
    })
}
