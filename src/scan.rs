//! Device discovery
//!
//! Backing devices are found through their `/dev/bcacheN` nodes, cache sets
//! through the directories under `/sys/fs/bcache`. Every candidate is
//! resolved in its own task; a candidate that cannot be resolved is
//! reported, never silently dropped.

use crate::device::{
    BackingDevice, CacheDevice, CacheSetId, DeviceLink, ParameterSnapshot, UuidSource,
};
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::registry::DeviceRegistry;
use crate::tools::parse_cset_uuid;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Statistics captured in the parameter snapshot
pub const STATS: &[&str] = &[
    "state",
    "stats_total/bypassed",
    "stats_total/cache_hits",
    "stats_total/cache_misses",
    "stats_total/cache_hit_ratio",
    "stats_total/cache_bypass_hits",
    "stats_total/cache_bypass_misses",
    "cache/congested",
    "writeback_percent",
    "dirty_data",
];

/// Settings captured in the parameter snapshot
pub const SETTINGS: &[&str] = &[
    "cache_mode",
    "cache/cache0/cache_replacement_policy",
    "cache/congested_write_threshold_us",
    "cache/congested_read_threshold_us",
    "readahead_cache_policy",
    "sequential_cutoff",
    "writeback_delay",
];

/// A device the scan saw but could not resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    #[serde(rename = "Device")]
    pub device: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

impl From<ResolutionFailure> for BcacheError {
    fn from(f: ResolutionFailure) -> Self {
        BcacheError::Resolution {
            device: f.device,
            reason: f.reason,
        }
    }
}

/// Outcome of a full scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub registry: DeviceRegistry,
    pub failures: Vec<ResolutionFailure>,
}

/// `bcache` followed by one or more digits
pub fn is_bcache_node(name: &str) -> bool {
    name.strip_prefix("bcache")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Last path component as a string
fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl BcacheHost {
    /// Enumerate and resolve every backing device and cache set
    pub async fn scan(&self) -> BcacheResult<ScanReport> {
        let nodes = self.backing_candidates().await?;
        let sets = self.cache_set_candidates().await?;
        debug!(
            "Scanning {} backing candidate(s) and {} cache set(s)",
            nodes.len(),
            sets.len()
        );

        let backing_tasks: Vec<JoinHandle<Result<BackingDevice, ResolutionFailure>>> = nodes
            .into_iter()
            .map(|node| {
                let host = self.clone();
                tokio::spawn(async move { host.resolve_backing(node).await })
            })
            .collect();

        let cache_tasks: Vec<JoinHandle<Result<CacheDevice, ResolutionFailure>>> = sets
            .into_iter()
            .map(|name| {
                let host = self.clone();
                tokio::spawn(async move { host.resolve_cache_set_dir(name).await })
            })
            .collect();

        let mut failures = Vec::new();
        let backing = collect(join_all(backing_tasks).await, &mut failures);
        let caches = collect(join_all(cache_tasks).await, &mut failures);

        for failure in &failures {
            warn!("Skipping {}: {}", failure.device, failure.reason);
        }

        Ok(ScanReport {
            registry: DeviceRegistry::new(backing, caches),
            failures,
        })
    }

    /// Scan and keep only the registry, after logging any per-device failures
    pub async fn registry(&self) -> BcacheResult<DeviceRegistry> {
        Ok(self.scan().await?.registry)
    }

    /// `/dev/bcacheN` nodes, sorted
    async fn backing_candidates(&self) -> BcacheResult<Vec<PathBuf>> {
        let dev_dir = self.sysfs().dev_dir();
        let entries = self
            .sysfs()
            .list_dir(dev_dir)
            .await
            .map_err(|e| BcacheError::Scan {
                path: dev_dir.to_path_buf(),
                source: e,
            })?;

        Ok(entries
            .into_iter()
            .filter(|e| is_bcache_node(&e.name))
            .map(|e| dev_dir.join(e.name))
            .collect())
    }

    /// Cache set directory names under `/sys/fs/bcache`, sorted
    async fn cache_set_candidates(&self) -> BcacheResult<Vec<String>> {
        let root = self.sysfs().bcache_root();
        let entries = self
            .sysfs()
            .list_dir(root)
            .await
            .map_err(|e| BcacheError::Scan {
                path: root.to_path_buf(),
                source: e,
            })?;

        Ok(entries
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| e.name)
            .collect())
    }

    /// Resolve one `/dev/bcacheN` node into a full record
    async fn resolve_backing(&self, node: PathBuf) -> Result<BackingDevice, ResolutionFailure> {
        let fail = |reason: String| ResolutionFailure {
            device: node.display().to_string(),
            reason,
        };

        let device_node = self
            .sysfs()
            .canonicalize(&node)
            .await
            .map_err(|e| fail(format!("cannot resolve device node: {}", e)))?;
        let short_name =
            file_name(&device_node).ok_or_else(|| fail("device node has no name".to_string()))?;

        let slaves = self
            .sysfs()
            .list_names_or_empty(&self.sysfs().block_dir(&short_name).join("slaves"))
            .await
            .map_err(|e| fail(e.to_string()))?;

        let (backing_dev, mut cache_dev) = self.resolve_slaves(&short_name, &slaves).await;
        let cache_set = self.resolve_cache_set(&short_name, &backing_dev).await;
        if cache_set == CacheSetId::NoneAttached {
            cache_dev = DeviceLink::NoneAttached;
        }

        let control = self.sysfs().control_dir(&short_name);
        let backing_uuid = self
            .sysfs()
            .read_optional(&control.join("backing_dev_uuid"))
            .await;

        let mut values = BTreeMap::new();
        for name in STATS.iter().chain(SETTINGS) {
            if let Some(value) = self.sysfs().read_optional(&control.join(name)).await {
                let key = name.rsplit('/').next().unwrap_or(name);
                values.insert(key.to_string(), value);
            }
        }

        debug!(
            "Resolved {} (backing {}, cache {}, set {})",
            short_name, backing_dev, cache_dev, cache_set
        );

        Ok(BackingDevice {
            short_name,
            device_node,
            backing_dev,
            cache_dev,
            cache_set,
            backing_uuid,
            slaves,
            parameters: ParameterSnapshot::new(values),
        })
    }

    /// Find the raw backing and cache devices through `slaves/`
    async fn resolve_slaves(&self, short_name: &str, slaves: &[String]) -> (DeviceLink, DeviceLink) {
        let slaves_dir = self.sysfs().block_dir(short_name).join("slaves");
        let mut backing = DeviceLink::Unknown;
        let mut cache = DeviceLink::Unknown;

        for slave in slaves {
            let slave_dir = slaves_dir.join(slave);
            let subtree = slave_dir.join("bcache");

            if !self.sysfs().exists(&subtree).await {
                debug!("{}: slave {} has no bcache subtree yet", short_name, slave);
                return (DeviceLink::Unregistered, DeviceLink::Unregistered);
            }

            let entries = match self.sysfs().list_dir(&subtree).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("{}: cannot list {}: {}", short_name, subtree.display(), e);
                    continue;
                }
            };

            for entry in entries {
                match entry.name.as_str() {
                    "dev" => {
                        backing = match self.sysfs().read_optional(&slave_dir.join("dev")).await {
                            Some(dev_id) => self.resolve_dev_id(&dev_id).await,
                            None => DeviceLink::Unknown,
                        };
                    }
                    "set" => {
                        cache = self.cache_device_of_set(&subtree.join("set")).await;
                    }
                    _ => {}
                }
            }
        }

        (backing, cache)
    }

    /// `major:minor` to a system device path through `/dev/block`
    async fn resolve_dev_id(&self, dev_id: &str) -> DeviceLink {
        match self
            .sysfs()
            .canonicalize(&self.sysfs().dev_block_link(dev_id))
            .await
        {
            Ok(path) => DeviceLink::Path(path),
            Err(e) => {
                debug!("Cannot resolve device {}: {}", dev_id, e);
                DeviceLink::Unknown
            }
        }
    }

    /// The device owning a set's `cache0`: the link target's parent component
    async fn cache_device_of_set(&self, set_dir: &Path) -> DeviceLink {
        match self.sysfs().read_link(&set_dir.join("cache0")).await {
            Ok(target) => target
                .parent()
                .and_then(file_name)
                .map(|name| DeviceLink::Path(self.sysfs().dev_dir().join(name)))
                .unwrap_or(DeviceLink::Unknown),
            Err(e) => {
                debug!("No cache0 in {}: {}", set_dir.display(), e);
                DeviceLink::Unknown
            }
        }
    }

    /// Cache set membership, from sysfs when linked, else from the superblock
    pub async fn resolve_cache_set(&self, short_name: &str, backing_dev: &DeviceLink) -> CacheSetId {
        let link = self.sysfs().control_dir(short_name).join("cache");

        if let Ok(target) = self.sysfs().canonicalize(&link).await {
            return match file_name(&target).and_then(|n| Uuid::parse_str(&n).ok()) {
                Some(uuid) => CacheSetId::Attached {
                    uuid,
                    source: UuidSource::Sysfs,
                },
                None => {
                    warn!("{}: cache link {} is not a cache set", short_name, target.display());
                    CacheSetId::Unknown
                }
            };
        }

        let Some(device) = backing_dev.path() else {
            debug!("{}: no backing device to read a superblock from", short_name);
            return CacheSetId::Unknown;
        };

        match self.tools().super_show(device).await {
            Ok(text) => match parse_cset_uuid(&text) {
                Some(uuid) if !uuid.is_nil() => CacheSetId::Attached {
                    uuid,
                    source: UuidSource::Superblock,
                },
                _ => CacheSetId::NoneAttached,
            },
            Err(e) => {
                warn!("{}: cannot read superblock of {}: {}", short_name, device.display(), e);
                CacheSetId::Unknown
            }
        }
    }

    /// Resolve one `/sys/fs/bcache/<uuid>` directory
    async fn resolve_cache_set_dir(&self, name: String) -> Result<CacheDevice, ResolutionFailure> {
        let fail = |reason: &str| ResolutionFailure {
            device: name.clone(),
            reason: reason.to_string(),
        };

        let uuid = Uuid::parse_str(&name).map_err(|_| fail("not a cache set UUID"))?;
        match self
            .cache_device_of_set(&self.sysfs().cache_set_dir(&name))
            .await
        {
            DeviceLink::Path(device) => Ok(CacheDevice { device, uuid }),
            _ => Err(fail("cache set has no resolvable cache0")),
        }
    }
}

fn collect<T>(
    results: Vec<Result<Result<T, ResolutionFailure>, tokio::task::JoinError>>,
    failures: &mut Vec<ResolutionFailure>,
) -> Vec<T> {
    let mut found = Vec::new();
    for result in results {
        match result {
            Ok(Ok(item)) => found.push(item),
            Ok(Err(failure)) => failures.push(failure),
            Err(e) => failures.push(ResolutionFailure {
                device: "<task>".to_string(),
                reason: e.to_string(),
            }),
        }
    }
    found
}
