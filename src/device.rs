//! Backing and cache device records produced by a scan

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shown when a slave has no bcache subtree yet
pub const UNREGISTERED: &str = "UNREGISTERED";

/// Shown when a backing device has no cache set
pub const NONE_ATTACHED: &str = "no cache";

/// A relationship to a raw block device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLink {
    /// Resolved system device path
    Path(PathBuf),
    /// The kernel knows the slave but has not published its bcache subtree
    Unregistered,
    /// Resolved, and there is nothing attached
    NoneAttached,
    /// Could not be determined
    Unknown,
}

impl DeviceLink {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Unregistered => f.write_str(UNREGISTERED),
            Self::NoneAttached => f.write_str(NONE_ATTACHED),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for DeviceLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a cache set UUID was read from. The two sources can disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UuidSource {
    /// The `bcache/cache` link in sysfs
    Sysfs,
    /// `cset.uuid` from the on-disk superblock
    Superblock,
}

impl fmt::Display for UuidSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sysfs => f.write_str("sysfs"),
            Self::Superblock => f.write_str("superblock"),
        }
    }
}

/// Cache set membership of a backing device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSetId {
    Attached { uuid: Uuid, source: UuidSource },
    NoneAttached,
    /// Neither sysfs nor the superblock gave an answer
    Unknown,
}

impl CacheSetId {
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            Self::Attached { uuid, .. } => Some(*uuid),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<UuidSource> {
        match self {
            Self::Attached { source, .. } => Some(*source),
            _ => None,
        }
    }
}

impl fmt::Display for CacheSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached { uuid, .. } => write!(f, "{}", uuid),
            Self::NoneAttached => f.write_str(NONE_ATTACHED),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Point-in-time copy of a device's parameters.
///
/// Clones share the stale flag, so a tunable write through any copy
/// invalidates all of them.
#[derive(Debug, Clone, Default)]
pub struct ParameterSnapshot {
    values: BTreeMap<String, String>,
    stale: Arc<AtomicBool>,
}

impl ParameterSnapshot {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            stale: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Value by short name (`cache_mode`, `dirty_data`, `cache_hits`, ...), `None` once stale
    pub fn get(&self, name: &str) -> Option<&str> {
        if self.is_stale() {
            return None;
        }
        self.values.get(name).map(String::as_str)
    }

    /// All values, empty once stale
    pub fn values(&self) -> Option<&BTreeMap<String, String>> {
        (!self.is_stale()).then_some(&self.values)
    }

    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

/// A registered bcache device (`/dev/bcacheN`) and what it is built from
#[derive(Debug, Clone)]
pub struct BackingDevice {
    /// Kernel name, e.g. `bcache0`
    pub short_name: String,
    /// Resolved device node, e.g. `/dev/bcache0`
    pub device_node: PathBuf,
    /// Raw backing block device
    pub backing_dev: DeviceLink,
    /// Raw cache block device
    pub cache_dev: DeviceLink,
    pub cache_set: CacheSetId,
    /// Content of `backing_dev_uuid`
    pub backing_uuid: Option<String>,
    /// Constituent block devices from `slaves/`
    pub slaves: Vec<String>,
    pub parameters: ParameterSnapshot,
}

impl BackingDevice {
    /// Every name the device can be addressed by
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = vec![
            self.short_name.clone(),
            self.device_node.to_string_lossy().into_owned(),
        ];
        if let Some(path) = self.backing_dev.path() {
            aliases.push(path.to_string_lossy().into_owned());
        }
        aliases
    }
}

impl Serialize for BackingDevice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BackingDevice", 9)?;
        s.serialize_field("BcacheDev", &self.device_node)?;
        s.serialize_field("ShortName", &self.short_name)?;
        s.serialize_field("BackingDev", &self.backing_dev)?;
        s.serialize_field("CacheDev", &self.cache_dev)?;
        s.serialize_field("BcacheDevUUID", &self.backing_uuid)?;
        s.serialize_field("CacheSetUUID", &self.cache_set.to_string())?;
        s.serialize_field("CacheSetSource", &self.cache_set.source())?;
        s.serialize_field("Devices", &self.slaves)?;
        s.serialize_field("Parameters", &self.parameters.values())?;
        s.end()
    }
}

/// A formatted and registered cache set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheDevice {
    /// System device of the set's first cache (`cache0`)
    #[serde(rename = "device")]
    pub device: PathBuf,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
}

impl CacheDevice {
    pub fn aliases(&self) -> Vec<String> {
        vec![
            self.device.to_string_lossy().into_owned(),
            self.uuid.to_string(),
        ]
    }
}
