//! Queryable snapshot of the devices found by one scan
//!
//! Lookups go through alias tables built once when the registry is
//! assembled. When two devices share an alias, the one constructed first
//! keeps it.

use crate::device::{BackingDevice, CacheDevice};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceRegistry {
    #[serde(rename = "BcacheDevs")]
    backing: Vec<BackingDevice>,
    #[serde(rename = "CacheDevs")]
    caches: Vec<CacheDevice>,
    #[serde(skip)]
    backing_index: HashMap<String, usize>,
    #[serde(skip)]
    cache_index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Build a registry, preserving the given order.
    ///
    /// Short names are unique: a later device with a name already seen is
    /// dropped.
    pub fn new(backing: Vec<BackingDevice>, caches: Vec<CacheDevice>) -> Self {
        let mut seen = HashSet::new();
        let backing: Vec<BackingDevice> = backing
            .into_iter()
            .filter(|device| {
                let fresh = seen.insert(device.short_name.clone());
                if !fresh {
                    warn!("{} was found twice, keeping the first", device.short_name);
                }
                fresh
            })
            .collect();

        let backing_index = index(backing.iter().map(BackingDevice::aliases));
        let cache_index = index(caches.iter().map(CacheDevice::aliases));

        Self {
            backing,
            caches,
            backing_index,
            cache_index,
        }
    }

    /// Find a backing device by short name, device node or raw backing device
    pub fn backing(&self, id: &str) -> Option<&BackingDevice> {
        self.backing_index.get(id).map(|&i| &self.backing[i])
    }

    /// Find a cache set by its cache device path or UUID
    pub fn cache(&self, id: &str) -> Option<&CacheDevice> {
        self.cache_index.get(id).map(|&i| &self.caches[i])
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.backing(id).is_some() || self.cache(id).is_some()
    }

    pub fn backing_devices(&self) -> &[BackingDevice] {
        &self.backing
    }

    pub fn cache_devices(&self) -> &[CacheDevice] {
        &self.caches
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty() && self.caches.is_empty()
    }
}

fn index(aliases: impl Iterator<Item = Vec<String>>) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (i, names) in aliases.enumerate() {
        for name in names {
            match map.get(&name) {
                Some(&first) if first != i => {
                    warn!("Alias {} is shared by two devices, keeping the first", name);
                }
                Some(_) => {}
                None => {
                    map.insert(name, i);
                }
            }
        }
    }
    map
}
