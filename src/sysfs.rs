//! sysfs and /dev access
//!
//! Every control file the tool touches is reached through [`Sysfs`], whose
//! roots come from configuration so a whole device tree can be rebuilt in
//! a temporary directory.

use crate::codec;
use crate::config::schema::PathsConfig;
use crate::error::{BcacheError, BcacheResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A directory entry name and whether it is a real directory (symlinks are not followed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem roots plus the primitive read/write operations on them
#[derive(Debug, Clone)]
pub struct Sysfs {
    paths: PathsConfig,
}

impl Sysfs {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// `/dev`
    pub fn dev_dir(&self) -> &Path {
        &self.paths.dev_dir
    }

    /// `/sys/fs/bcache`
    pub fn bcache_root(&self) -> &Path {
        &self.paths.sys_bcache_dir
    }

    /// `/sys/fs/bcache/register`
    pub fn register_file(&self) -> PathBuf {
        self.paths.sys_bcache_dir.join("register")
    }

    /// `/sys/fs/bcache/<uuid>`
    pub fn cache_set_dir(&self, uuid: &str) -> PathBuf {
        self.paths.sys_bcache_dir.join(uuid)
    }

    /// `/sys/block/<short>`
    pub fn block_dir(&self, short_name: &str) -> PathBuf {
        self.paths.sys_block_dir.join(short_name)
    }

    /// `/sys/block/<short>/bcache`, the control directory of a bcache device
    pub fn control_dir(&self, short_name: &str) -> PathBuf {
        self.block_dir(short_name).join("bcache")
    }

    /// `/dev/block/<major:minor>`
    pub fn dev_block_link(&self, dev_id: &str) -> PathBuf {
        self.paths.dev_block_dir.join(dev_id)
    }

    /// Locate the sysfs directory of a raw block device or partition.
    ///
    /// Whole disks live at `/sys/block/<name>`, partitions one level deeper
    /// under their disk (`sda1` under `sda`, `nvme0n1p2` under `nvme0n1`).
    pub async fn device_sysfs_dir(&self, device: &str) -> PathBuf {
        let name = Path::new(device)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| device.to_string());

        let whole = self.paths.sys_block_dir.join(&name);
        if self.exists(&whole).await {
            return whole;
        }

        match parent_disk(&name) {
            Some(disk) => self.paths.sys_block_dir.join(disk).join(&name),
            None => whole,
        }
    }

    /// Whether a path exists (following symlinks)
    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Read a control file, stripping the trailing newline
    pub async fn read_raw(&self, path: &Path) -> BcacheResult<String> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BcacheError::ControlRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(content.trim_end_matches('\n').to_string())
    }

    /// Read a control file and decode choice lists
    pub async fn read_decoded(&self, path: &Path) -> BcacheResult<String> {
        let raw = self.read_raw(path).await?;
        Ok(codec::decode(&raw))
    }

    /// Read a control file, treating absence or an empty value as `None`
    pub async fn read_optional(&self, path: &Path) -> Option<String> {
        match self.read_decoded(path).await {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Write a value to an existing control file.
    ///
    /// The file is never created: a missing control file means the kernel
    /// does not offer it.
    pub async fn write_value(&self, path: &Path, value: &str) -> BcacheResult<()> {
        debug!("Writing {:?} to {}", value, path.display());

        let write_err = |e| BcacheError::ControlWrite {
            path: path.to_path_buf(),
            source: e,
        };

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(write_err)?;
        file.write_all(value.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(())
    }

    /// Fully resolve a path through all symlinks
    pub async fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        fs::canonicalize(path).await
    }

    /// Read the target of a single symlink
    pub async fn read_link(&self, path: &Path) -> std::io::Result<PathBuf> {
        fs::read_link(path).await
    }

    /// List a directory sorted by name
    pub async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// List a directory, treating a missing directory as empty
    pub async fn list_names_or_empty(&self, path: &Path) -> BcacheResult<Vec<String>> {
        match self.list_dir(path).await {
            Ok(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(BcacheError::io(format!("listing {}", path.display()), e)),
        }
    }
}

/// Strip a partition suffix: `sda1` -> `sda`, `nvme0n1p2` -> `nvme0n1`.
fn parent_disk(name: &str) -> Option<&str> {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == name.len() || stem.is_empty() {
        return None;
    }

    match stem.strip_suffix('p') {
        Some(disk) if disk.ends_with(|c: char| c.is_ascii_digit()) => Some(disk),
        _ => Some(stem),
    }
}
