//! Text and JSON views of a registry

use crate::device::{BackingDevice, UuidSource};
use crate::error::BcacheResult;
use crate::registry::DeviceRegistry;
use crate::scan::{ResolutionFailure, ScanReport};
use crate::tunable::TunableTable;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Columns every table starts with
pub const BASE_COLUMNS: &[&str] = &["BcacheDev", "BackingDev", "CacheDev", "cache_mode", "state"];

/// Output format for list, show and print-tunables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    /// Short names only
    Short,
}

#[derive(Serialize)]
struct ListView<'a> {
    #[serde(flatten)]
    registry: &'a DeviceRegistry,
    #[serde(rename = "Failures")]
    failures: &'a [ResolutionFailure],
}

/// Render every device of a scan; `extra` names additional parameter columns.
///
/// Devices the scan could not resolve are listed too, except in short form.
pub fn render(report: &ScanReport, format: OutputFormat, extra: &[String]) -> BcacheResult<String> {
    let registry = &report.registry;
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&ListView {
            registry,
            failures: &report.failures,
        })?),
        OutputFormat::Short => Ok(registry
            .backing_devices()
            .iter()
            .map(|d| format!("{}\n", d.short_name))
            .collect()),
        OutputFormat::Table => {
            let mut out = render_table(registry, extra);
            if !report.failures.is_empty() {
                out.push_str("\nUnresolved devices:\n");
                for failure in &report.failures {
                    let _ = writeln!(out, "{}: {}", failure.device, failure.reason);
                }
            }
            Ok(out)
        }
    }
}

fn render_table(registry: &DeviceRegistry, extra: &[String]) -> String {
    let mut out = String::from("bcache devices:\n");

    if registry.backing_devices().is_empty() {
        out.push_str("None found.\n");
    } else {
        let columns: Vec<&str> = BASE_COLUMNS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .collect();

        for column in &columns {
            let _ = write!(out, "{:<18}", column);
        }
        out.truncate(out.trim_end_matches(' ').len());
        out.push('\n');

        for device in registry.backing_devices() {
            let row: String = columns
                .iter()
                .map(|column| format!("{:<18}", cell(device, column)))
                .collect();
            out.push_str(row.trim_end());
            out.push('\n');
        }
    }

    out.push_str("\nRegistered cache devices:\n");
    if registry.cache_devices().is_empty() {
        out.push_str("None found.\n");
    } else {
        for cache in registry.cache_devices() {
            let _ = writeln!(out, "{} {}", cache.device.display(), cache.uuid);
        }
    }
    out
}

fn cell(device: &BackingDevice, column: &str) -> String {
    match column {
        "BcacheDev" => device.device_node.display().to_string(),
        "BackingDev" => device.backing_dev.to_string(),
        "CacheDev" => device.cache_dev.to_string(),
        name => device
            .parameters
            .get(parameter_key(name))
            .unwrap_or("-")
            .to_string(),
    }
}

/// Snapshot key of a parameter path: `stats_total/cache_hits` -> `cache_hits`
fn parameter_key(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[derive(Serialize)]
struct DeviceDetail<'a> {
    #[serde(rename = "ShortName")]
    short_name: &'a str,
    #[serde(rename = "BcacheDevUUID")]
    backing_uuid: Option<&'a str>,
    #[serde(rename = "CacheSetUUID")]
    cache_set: String,
    #[serde(rename = "CacheSetSource")]
    cache_set_source: Option<UuidSource>,
    #[serde(rename = "ExtendedInfo")]
    extended: BTreeMap<String, String>,
}

/// Full detail of one backing device
pub fn render_device(device: &BackingDevice, format: OutputFormat) -> BcacheResult<String> {
    let mut extended = BTreeMap::new();
    extended.insert("BcacheDev".to_string(), device.device_node.display().to_string());
    extended.insert("BackingDev".to_string(), device.backing_dev.to_string());
    extended.insert("CacheDev".to_string(), device.cache_dev.to_string());
    if let Some(values) = device.parameters.values() {
        extended.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if format == OutputFormat::Json {
        let detail = DeviceDetail {
            short_name: &device.short_name,
            backing_uuid: device.backing_uuid.as_deref(),
            cache_set: device.cache_set.to_string(),
            cache_set_source: device.cache_set.source(),
            extended,
        };
        return Ok(serde_json::to_string_pretty(&detail)?);
    }

    let source = device
        .cache_set
        .source()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    for (key, value) in [
        ("ShortName", device.short_name.clone()),
        (
            "Bcache Dev UUID",
            device.backing_uuid.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("Cache Set UUID", device.cache_set.to_string()),
        ("Cache Set Source", source),
    ]
    .into_iter()
    .chain(extended.iter().map(|(k, v)| (k.as_str(), v.clone())))
    {
        let _ = writeln!(out, "{:<30}{}", format!("{}:", key), value);
    }
    Ok(out)
}

/// Current tunables; the text form is itself a loadable tuning profile
pub fn render_tunables(table: &TunableTable, format: OutputFormat) -> BcacheResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(table)?),
        _ => Ok(toml::to_string(table)?),
    }
}
