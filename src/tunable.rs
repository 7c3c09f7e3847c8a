//! Reading and writing device parameters
//!
//! Only allow-listed tunables can be written. Validation happens before
//! any control file is touched, and every successful write marks the
//! device's parameter snapshot stale.

use crate::codec::{self, TuneSpec};
use crate::config::TuningProfile;
use crate::device::BackingDevice;
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::registry::DeviceRegistry;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Cache modes the kernel accepts
pub const CACHE_MODES: &[&str] = &["writethrough", "writeback", "writearound", "none"];

/// Writable bcache parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tunable {
    SequentialCutoff,
    CacheMode,
    WritebackPercent,
    WritebackDelay,
    WritebackRate,
    CongestedWriteThreshold,
    CongestedReadThreshold,
}

impl Tunable {
    pub const ALL: [Tunable; 7] = [
        Tunable::SequentialCutoff,
        Tunable::CacheMode,
        Tunable::WritebackPercent,
        Tunable::WritebackDelay,
        Tunable::WritebackRate,
        Tunable::CongestedWriteThreshold,
        Tunable::CongestedReadThreshold,
    ];

    /// Path relative to the control directory, also the user-facing name
    pub fn path(self) -> &'static str {
        match self {
            Self::SequentialCutoff => "sequential_cutoff",
            Self::CacheMode => "cache_mode",
            Self::WritebackPercent => "writeback_percent",
            Self::WritebackDelay => "writeback_delay",
            Self::WritebackRate => "writeback_rate",
            Self::CongestedWriteThreshold => "cache/congested_write_threshold_us",
            Self::CongestedReadThreshold => "cache/congested_read_threshold_us",
        }
    }

    /// Whether values may be given with a `k`/`m`/`g` suffix
    pub fn is_size(self) -> bool {
        matches!(self, Self::SequentialCutoff | Self::WritebackRate)
    }

    /// Turn a user value into what the kernel expects
    pub fn encode(self, value: &str) -> BcacheResult<String> {
        if self.is_size() {
            return codec::human_to_bytes(value).map(|bytes| bytes.to_string());
        }

        let value = value.trim();
        if self == Self::CacheMode && !CACHE_MODES.contains(&value) {
            return Err(BcacheError::InvalidValue {
                value: value.to_string(),
                reason: format!("cache mode must be one of: {}", CACHE_MODES.join(", ")),
            });
        }
        if value.is_empty() {
            return Err(BcacheError::InvalidValue {
                value: value.to_string(),
                reason: "empty value".to_string(),
            });
        }
        Ok(value.to_string())
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Tunable {
    type Err = BcacheError;

    /// Accepts the full path or, for `cache/` tunables, the bare file name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.path() == s || t.path().strip_prefix("cache/") == Some(s))
            .ok_or_else(|| BcacheError::TunableNotAllowed(s.to_string()))
    }
}

/// Result of one tunable write on one device
#[derive(Debug)]
pub struct TuneOutcome {
    pub device: String,
    pub tunable: String,
    pub result: BcacheResult<()>,
}

/// Per-device outcomes of a bulk tune
#[derive(Debug, Default)]
pub struct TuneReport {
    pub outcomes: Vec<TuneOutcome>,
}

impl TuneReport {
    pub fn failures(&self) -> Vec<&TuneOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Collapse into an error naming every failing device
    pub fn into_result(self) -> BcacheResult<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            return Ok(self);
        }
        let names: Vec<String> = failures
            .iter()
            .map(|o| format!("{} ({})", o.device, o.tunable))
            .collect();
        Err(BcacheError::TuneFailed(names.len(), names.join(", ")))
    }
}

/// Current allow-listed values: device key, then tunable, then value
pub type TunableTable = BTreeMap<String, BTreeMap<String, String>>;

impl BcacheHost {
    /// Decoded current value of any parameter under the control directory
    pub async fn read_parameter(&self, device: &BackingDevice, name: &str) -> BcacheResult<String> {
        let path = self.sysfs().control_dir(&device.short_name).join(name);
        self.sysfs().read_decoded(&path).await
    }

    /// Validate and write one tunable
    pub async fn write_tunable(
        &self,
        device: &BackingDevice,
        name: &str,
        value: &str,
    ) -> BcacheResult<()> {
        let tunable: Tunable = name.parse()?;
        let path = self.tunable_path(device, tunable);
        if !self.sysfs().exists(&path).await {
            return Err(BcacheError::TunableUnavailable { path });
        }
        let encoded = tunable.encode(value)?;

        self.sysfs().write_value(&path, &encoded).await?;
        device.parameters.invalidate();
        info!("{}: set {} to {}", device.short_name, tunable, encoded);
        Ok(())
    }

    /// Write one tunable on the backing device matching `id`
    pub async fn tune(
        &self,
        registry: &DeviceRegistry,
        id: &str,
        spec: &TuneSpec,
    ) -> BcacheResult<()> {
        let device = registry
            .backing(id)
            .ok_or_else(|| BcacheError::NotBacking(id.to_string()))?;
        self.write_tunable(device, &spec.name, &spec.value).await
    }

    /// Apply one tunable to every backing device concurrently
    pub async fn tune_all(
        &self,
        registry: &DeviceRegistry,
        spec: &TuneSpec,
    ) -> BcacheResult<TuneReport> {
        let tunable: Tunable = spec.name.parse()?;
        tunable.encode(&spec.value)?;

        let plans = registry
            .backing_devices()
            .iter()
            .map(|device| (device.clone(), vec![(spec.name.clone(), spec.value.clone())]))
            .collect();
        Ok(self.apply_plans(plans).await)
    }

    /// Apply the matching profile section to every backing device
    pub async fn apply_profile(
        &self,
        registry: &DeviceRegistry,
        profile: &TuningProfile,
    ) -> TuneReport {
        let plans = registry
            .backing_devices()
            .iter()
            .filter_map(|device| {
                let cset = device.cache_set.uuid().map(|u| u.to_string());
                let section =
                    profile.section_for(device.backing_uuid.as_deref(), cset.as_deref())?;
                debug!("{}: applying {} profile value(s)", device.short_name, section.len());
                let entries = section
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some((device.clone(), entries))
            })
            .collect();
        self.apply_plans(plans).await
    }

    /// Every allow-listed tunable of every backing device that the kernel exposes
    pub async fn current_tunables(&self, registry: &DeviceRegistry) -> TunableTable {
        let mut table = BTreeMap::new();
        for device in registry.backing_devices() {
            let mut values = BTreeMap::new();
            for tunable in Tunable::ALL {
                let path = self.tunable_path(device, tunable);
                if let Some(value) = self.sysfs().read_optional(&path).await {
                    values.insert(tunable.path().to_string(), value);
                }
            }
            let key = device
                .backing_uuid
                .clone()
                .unwrap_or_else(|| device.short_name.clone());
            table.insert(key, values);
        }
        table
    }

    fn tunable_path(&self, device: &BackingDevice, tunable: Tunable) -> PathBuf {
        self.sysfs()
            .control_dir(&device.short_name)
            .join(tunable.path())
    }

    /// One task per device; entries within a device are written in order
    async fn apply_plans(&self, plans: Vec<(BackingDevice, Vec<(String, String)>)>) -> TuneReport {
        let tasks = plans.into_iter().map(|(device, entries)| {
            let host = self.clone();
            tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(entries.len());
                for (name, value) in entries {
                    let result = host.write_tunable(&device, &name, &value).await;
                    match &result {
                        Err(e) if e.is_validation() => {
                            warn!("{}: skipped {}: {}", device.short_name, name, e)
                        }
                        Err(e) => warn!("{}: {}", device.short_name, e),
                        Ok(()) => {}
                    }
                    outcomes.push(TuneOutcome {
                        device: device.short_name.clone(),
                        tunable: name,
                        result,
                    });
                }
                outcomes
            })
        });

        let mut report = TuneReport::default();
        for joined in join_all(tasks).await {
            match joined {
                Ok(outcomes) => report.outcomes.extend(outcomes),
                Err(e) => report.outcomes.push(TuneOutcome {
                    device: "<task>".to_string(),
                    tunable: String::new(),
                    result: Err(BcacheError::User(e.to_string())),
                }),
            }
        }
        report
    }
}
