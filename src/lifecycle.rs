//! Register, stop, attach, detach and format
//!
//! The kernel applies most of these asynchronously. Where there is an
//! observable post-condition, it is re-read after the trigger write and a
//! mismatch is reported instead of assumed away.

use crate::device::{BackingDevice, CacheSetId, UuidSource};
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::poll::{poll_until, PollOutcome};
use crate::registry::DeviceRegistry;
use crate::tools::{FormatRequest, ToolOutput};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Value written to `stop` triggers
const STOP: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The kernel already knew the device; nothing was written
    AlreadyRegistered,
    /// Registered as the backing device `bcacheN`
    Backing { short_name: String },
    /// Registered as a cache device of the given set
    Cache { uuid: Uuid },
    /// The control directory appeared but the device is not in a fresh scan yet
    Registered { device: String },
}

impl fmt::Display for RegisterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => f.write_str("already registered"),
            Self::Backing { short_name } => write!(f, "registered as {}", short_name),
            Self::Cache { uuid } => write!(f, "registered in cache set {}", uuid),
            Self::Registered { device } => write!(f, "{} registered", device),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The control directory is gone
    Removed,
    /// The stop was accepted but sysfs still shows the device
    MayStillBePresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    AlreadyAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// The `cache` link is gone
    Detached,
    /// Accepted; the kernel drops the link once dirty data is written back
    Pending,
    /// There was no cache set to detach from
    AlreadyDetached,
}

impl BcacheHost {
    /// Ask the kernel to register a formatted device and wait for it to show up
    pub async fn register(
        &self,
        registry: &DeviceRegistry,
        device: &str,
        cancel: &CancellationToken,
    ) -> BcacheResult<RegisterOutcome> {
        if registry.is_registered(device) {
            debug!("{} is already in the registry", device);
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        let node = self.sysfs().device_sysfs_dir(device).await.join("bcache");
        if self.sysfs().exists(&node).await {
            debug!("{} already exists", node.display());
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        if let Err(e) = self
            .sysfs()
            .write_value(&self.sysfs().register_file(), device)
            .await
        {
            // udev may have registered it between the check and the write
            if self.sysfs().exists(&node).await {
                return Ok(RegisterOutcome::AlreadyRegistered);
            }
            return Err(e);
        }

        let sysfs = self.sysfs();
        let watched = &node;
        let polled = poll_until(self.register_policy(), cancel, move || {
            sysfs.exists(watched)
        })
        .await;

        if let PollOutcome::Cancelled { .. } = polled {
            return Err(BcacheError::Interrupted(device.to_string()));
        }
        if !polled.is_satisfied() {
            return Err(BcacheError::ConfirmationTimeout {
                device: device.to_string(),
                path: node,
                attempts: polled.attempts(),
            });
        }

        let fresh = self.registry().await?;
        let outcome = if let Some(backing) = fresh.backing(device) {
            RegisterOutcome::Backing {
                short_name: backing.short_name.clone(),
            }
        } else if let Some(cache) = fresh.cache(device) {
            RegisterOutcome::Cache { uuid: cache.uuid }
        } else {
            RegisterOutcome::Registered {
                device: device.to_string(),
            }
        };

        info!("{}: {}", device, outcome);
        Ok(outcome)
    }

    /// Stop a device and wait for its control directory to go away
    pub async fn stop(
        &self,
        registry: &DeviceRegistry,
        device: &str,
        cancel: &CancellationToken,
    ) -> BcacheResult<StopOutcome> {
        let (trigger, watched) = if let Some(backing) = registry.backing(device) {
            let control = self.sysfs().control_dir(&backing.short_name);
            (control.join("stop"), control)
        } else if let Some(cache) = registry.cache(device) {
            let node = self
                .sysfs()
                .device_sysfs_dir(&cache.device.to_string_lossy())
                .await
                .join("bcache");
            (node.join("set").join("stop"), node)
        } else {
            let node = self.sysfs().device_sysfs_dir(device).await.join("bcache");
            if !self.sysfs().exists(&node).await {
                return Err(BcacheError::NotRegistered(device.to_string()));
            }
            (node.join("stop"), node)
        };

        self.sysfs().write_value(&trigger, STOP).await?;
        info!("Stopping {}", device);

        if self.wait_for_removal(&watched, cancel).await {
            Ok(StopOutcome::Removed)
        } else {
            warn!("{} was stopped but may still be in sysfs", device);
            Ok(StopOutcome::MayStillBePresent)
        }
    }

    /// Release a device from the kernel; it stays formatted
    pub async fn unregister(&self, registry: &DeviceRegistry, device: &str) -> BcacheResult<()> {
        let trigger = if let Some(backing) = registry.backing(device) {
            self.sysfs().control_dir(&backing.short_name).join("stop")
        } else if let Some(cache) = registry.cache(device) {
            self.sysfs()
                .cache_set_dir(&cache.uuid.to_string())
                .join("stop")
        } else {
            return Err(BcacheError::NotRegistered(device.to_string()));
        };

        self.sysfs().write_value(&trigger, STOP).await?;
        info!("Unregistered {}", device);
        Ok(())
    }

    /// Attach a cache set to a backing device and confirm the kernel did it
    pub async fn attach(
        &self,
        registry: &DeviceRegistry,
        cache_id: &str,
        backing_id: &str,
    ) -> BcacheResult<AttachOutcome> {
        let (uuid, backing) = lookup_pair(registry, cache_id, backing_id)?;

        // A superblock only records intent; the kernel link is what counts
        if let CacheSetId::Attached {
            uuid: current,
            source: UuidSource::Sysfs,
        } = &backing.cache_set
        {
            if *current == uuid {
                return Ok(AttachOutcome::AlreadyAttached);
            }
        }

        let control = self.sysfs().control_dir(&backing.short_name);
        self.sysfs()
            .write_value(&control.join("attach"), &uuid.to_string())
            .await?;
        backing.parameters.invalidate();

        let found = self
            .resolve_cache_set(&backing.short_name, &backing.backing_dev)
            .await;
        if found.uuid() != Some(uuid) {
            return Err(BcacheError::AttachMismatch {
                backing: backing.short_name.clone(),
                expected: uuid.to_string(),
                found: found.to_string(),
            });
        }

        info!("Attached cache set {} to {}", uuid, backing.short_name);
        Ok(AttachOutcome::Attached)
    }

    /// Detach a cache set from a backing device
    pub async fn detach(
        &self,
        registry: &DeviceRegistry,
        cache_id: &str,
        backing_id: &str,
        cancel: &CancellationToken,
    ) -> BcacheResult<DetachOutcome> {
        let (uuid, backing) = lookup_pair(registry, cache_id, backing_id)?;

        match backing.cache_set.uuid() {
            None => return Ok(DetachOutcome::AlreadyDetached),
            Some(current) if current != uuid => {
                return Err(BcacheError::NotAttached {
                    backing: backing.short_name.clone(),
                    cache_set: uuid.to_string(),
                })
            }
            Some(_) => {}
        }

        let control = self.sysfs().control_dir(&backing.short_name);
        self.sysfs()
            .write_value(&control.join("detach"), &uuid.to_string())
            .await?;
        backing.parameters.invalidate();

        if self.wait_for_removal(&control.join("cache"), cancel).await {
            info!("Detached cache set {} from {}", uuid, backing.short_name);
            Ok(DetachOutcome::Detached)
        } else {
            warn!(
                "{} still links cache set {}; detach completes after writeback",
                backing.short_name, uuid
            );
            Ok(DetachOutcome::Pending)
        }
    }

    /// Format devices with `make-bcache` and register the result
    pub async fn format(
        &self,
        registry: &DeviceRegistry,
        request: &FormatRequest,
        cancel: &CancellationToken,
    ) -> BcacheResult<Vec<(PathBuf, RegisterOutcome)>> {
        let devices = request.devices();
        if devices.is_empty() {
            return Err(BcacheError::User(
                "Nothing to format: give a backing and/or cache device".to_string(),
            ));
        }

        if request.wipe {
            for device in &devices {
                let name = device.to_string_lossy();
                match self.stop(registry, &name, cancel).await {
                    Ok(_) | Err(BcacheError::NotRegistered(_)) => {}
                    Err(e) => return Err(e),
                }
                let wiped = self.tools().wipefs(device).await?;
                if !wiped.success {
                    return Err(BcacheError::command_exec(
                        format!("wipefs -a {}", name),
                        wiped.output,
                    ));
                }
            }
        }

        let output = self.tools().make_bcache(request).await?;
        if !output.success {
            return Err(classify_failure(&output, &devices, request));
        }
        info!("Formatted {}", describe(&devices));

        let fresh = self.registry().await?;
        let mut outcomes = Vec::with_capacity(devices.len());
        for device in devices {
            let outcome = self
                .register(&fresh, &device.to_string_lossy(), cancel)
                .await?;
            outcomes.push((device.to_path_buf(), outcome));
        }
        Ok(outcomes)
    }

    /// Raw superblock dump; backing device identifiers resolve to their raw device
    pub async fn superblock(&self, registry: &DeviceRegistry, device: &str) -> BcacheResult<String> {
        let raw = registry
            .backing(device)
            .and_then(|b| b.backing_dev.path())
            .or_else(|| registry.cache(device).map(|c| c.device.as_path()))
            .unwrap_or_else(|| Path::new(device));
        self.tools().super_show(raw).await
    }

    async fn wait_for_removal(&self, path: &Path, cancel: &CancellationToken) -> bool {
        let sysfs = self.sysfs();
        poll_until(self.stop_policy(), cancel, move || async move {
            !sysfs.exists(path).await
        })
        .await
        .is_satisfied()
    }
}

fn lookup_pair<'r>(
    registry: &'r DeviceRegistry,
    cache_id: &str,
    backing_id: &str,
) -> BcacheResult<(Uuid, &'r BackingDevice)> {
    let backing = registry
        .backing(backing_id)
        .ok_or_else(|| BcacheError::NotBacking(backing_id.to_string()))?;
    let cache = registry
        .cache(cache_id)
        .ok_or_else(|| BcacheError::NotCache(cache_id.to_string()))?;
    Ok((cache.uuid, backing))
}

fn describe(devices: &[&Path]) -> String {
    devices
        .iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map known `make-bcache` complaints to specific errors
fn classify_failure(output: &ToolOutput, devices: &[&Path], request: &FormatRequest) -> BcacheError {
    let culprit = devices
        .iter()
        .map(|d| d.display().to_string())
        .find(|d| output.output.contains(d.as_str()))
        .unwrap_or_else(|| describe(devices));

    if output.output.contains("Device or resource busy") {
        BcacheError::DeviceBusy(culprit)
    } else if output.output.contains("Already a bcache device") {
        BcacheError::AlreadyFormatted(culprit)
    } else if output.output.contains("non-bcache superblock") {
        BcacheError::ForeignSuperblock(culprit)
    } else {
        BcacheError::command_exec(
            format!("make-bcache {}", request.make_bcache_args().join(" ")),
            output.output.trim(),
        )
    }
}
