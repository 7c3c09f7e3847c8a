//! Writeback flush
//!
//! Drains dirty data by temporarily switching a writeback device to
//! writethrough with a minimal writeback delay, then puts both settings
//! back. Restoration runs whatever happened while draining.
//!
//! ```text
//! Idle -> Draining -> Clean    -> Restoring -> Done
//!                  -> TimedOut -> Restoring -> Done
//! Idle -> Done (not in writeback, or nothing could be changed)
//! ```

use crate::device::BackingDevice;
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::registry::DeviceRegistry;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CACHE_MODE: &str = "cache_mode";
const WRITEBACK_DELAY: &str = "writeback_delay";
const STATE: &str = "state";

/// The parameters a flush reads and writes on one device
#[async_trait]
pub trait DeviceControl: Send + Sync {
    fn name(&self) -> &str;

    /// Decoded current value of a parameter
    async fn read(&self, parameter: &str) -> BcacheResult<String>;

    /// Write an allow-listed tunable
    async fn write(&self, tunable: &str, value: &str) -> BcacheResult<()>;
}

/// A scanned backing device on a host
pub struct BoundDevice {
    host: BcacheHost,
    device: BackingDevice,
}

impl BoundDevice {
    pub fn new(host: BcacheHost, device: BackingDevice) -> Self {
        Self { host, device }
    }
}

#[async_trait]
impl DeviceControl for BoundDevice {
    fn name(&self) -> &str {
        &self.device.short_name
    }

    async fn read(&self, parameter: &str) -> BcacheResult<String> {
        self.host.read_parameter(&self.device, parameter).await
    }

    async fn write(&self, tunable: &str, value: &str) -> BcacheResult<()> {
        self.host.write_tunable(&self.device, tunable, value).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Draining,
    Clean,
    TimedOut,
    Restoring,
    Done,
}

#[derive(Debug)]
pub enum DrainOutcome {
    /// Not in writeback mode; nothing to drain
    Skipped { mode: String },
    Clean { polls: u32 },
    TimedOut { polls: u32 },
    Cancelled { polls: u32 },
    /// Could not read the settings or start the drain
    SetupFailed(BcacheError),
}

impl fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { mode } => write!(f, "nothing to flush ({} mode)", mode),
            Self::Clean { polls } => write!(f, "clean after {} check(s)", polls),
            Self::TimedOut { polls } => write!(f, "still dirty after {} check(s)", polls),
            Self::Cancelled { polls } => write!(f, "cancelled after {} check(s)", polls),
            Self::SetupFailed(e) => write!(f, "could not start: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum RestoreOutcome {
    NotNeeded,
    Restored,
    Failed(BcacheError),
}

impl RestoreOutcome {
    fn from_result(result: BcacheResult<()>) -> Self {
        match result {
            Ok(()) => Self::Restored,
            Err(e) => Self::Failed(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What happened to one device
#[derive(Debug)]
pub struct FlushReport {
    pub device: String,
    pub drain: DrainOutcome,
    pub restore_mode: RestoreOutcome,
    pub restore_delay: RestoreOutcome,
    pub history: Vec<FlushState>,
}

impl FlushReport {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            drain: DrainOutcome::Skipped {
                mode: String::new(),
            },
            restore_mode: RestoreOutcome::NotNeeded,
            restore_delay: RestoreOutcome::NotNeeded,
            history: vec![FlushState::Idle],
        }
    }

    fn enter(&mut self, state: FlushState) {
        debug!("{}: {:?}", self.device, state);
        self.history.push(state);
    }

    /// Drained (or nothing to drain) and both settings restored
    pub fn is_success(&self) -> bool {
        matches!(
            self.drain,
            DrainOutcome::Skipped { .. } | DrainOutcome::Clean { .. }
        ) && !self.restore_mode.is_failed()
            && !self.restore_delay.is_failed()
    }

    /// One-line summary including any restoration failure
    pub fn summary(&self) -> String {
        let mut line = self.drain.to_string();
        for (what, outcome) in [
            (CACHE_MODE, &self.restore_mode),
            (WRITEBACK_DELAY, &self.restore_delay),
        ] {
            if let RestoreOutcome::Failed(e) = outcome {
                line.push_str(&format!("; restoring {} failed: {}", what, e));
            }
        }
        line
    }
}

/// Runs the flush state machine
#[derive(Debug, Clone)]
pub struct FlushEngine {
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl FlushEngine {
    pub fn new(policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub async fn run(&self, device: &dyn DeviceControl) -> FlushReport {
        let mut report = FlushReport::new(device.name());

        let mode = match device.read(CACHE_MODE).await {
            Ok(mode) => mode,
            Err(e) => return setup_failed(report, e),
        };
        if mode != "writeback" {
            debug!("{}: {} mode, nothing to flush", device.name(), mode);
            report.drain = DrainOutcome::Skipped { mode };
            report.enter(FlushState::Done);
            return report;
        }

        let delay = match device.read(WRITEBACK_DELAY).await {
            Ok(delay) => delay,
            Err(e) => return setup_failed(report, e),
        };
        if let Err(e) = device.write(WRITEBACK_DELAY, "1").await {
            return setup_failed(report, e);
        }

        match device.write(CACHE_MODE, "writethrough").await {
            Err(e) => {
                warn!("{}: could not switch to writethrough: {}", device.name(), e);
                report.drain = DrainOutcome::SetupFailed(e);
            }
            Ok(()) => {
                report.enter(FlushState::Draining);
                info!("{}: draining dirty data", device.name());
                let drain = self.drain(device).await;
                let next = match drain {
                    DrainOutcome::Clean { .. } => Some(FlushState::Clean),
                    DrainOutcome::TimedOut { .. } => Some(FlushState::TimedOut),
                    _ => None,
                };
                if next != Some(FlushState::Clean) {
                    warn!("{}: {}", device.name(), drain);
                }
                report.drain = drain;
                if let Some(state) = next {
                    report.enter(state);
                }
            }
        }

        report.enter(FlushState::Restoring);
        report.restore_mode =
            RestoreOutcome::from_result(device.write(CACHE_MODE, "writeback").await);
        report.restore_delay =
            RestoreOutcome::from_result(device.write(WRITEBACK_DELAY, &delay).await);
        report.enter(FlushState::Done);

        if report.is_success() {
            info!("{}: flushed, {}", device.name(), report.drain);
        }
        report
    }

    async fn drain(&self, device: &dyn DeviceControl) -> DrainOutcome {
        let outcome = poll_until(self.policy, &self.cancel, move || async move {
            match device.read(STATE).await {
                Ok(state) => state == "clean",
                Err(e) => {
                    debug!("{}: cannot read state: {}", device.name(), e);
                    false
                }
            }
        })
        .await;

        match outcome {
            PollOutcome::Satisfied { attempts } => DrainOutcome::Clean { polls: attempts },
            PollOutcome::Exhausted { attempts } => DrainOutcome::TimedOut { polls: attempts },
            PollOutcome::Cancelled { attempts } => DrainOutcome::Cancelled { polls: attempts },
        }
    }
}

fn setup_failed(mut report: FlushReport, error: BcacheError) -> FlushReport {
    warn!("{}: flush not started: {}", report.device, error);
    report.drain = DrainOutcome::SetupFailed(error);
    report.enter(FlushState::Done);
    report
}

/// Reports for every flushed device, in request order
#[derive(Debug, Default)]
pub struct BulkFlushReport {
    pub reports: Vec<FlushReport>,
}

impl BulkFlushReport {
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(FlushReport::is_success)
    }

    pub fn failures(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.device.as_str())
            .collect()
    }

    pub fn into_result(self) -> BcacheResult<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(BcacheError::FlushFailed(failures.len(), failures.join(", ")))
        }
    }
}

/// Flush every device concurrently; one device never holds up another
pub async fn flush_many(
    engine: &FlushEngine,
    devices: Vec<Arc<dyn DeviceControl>>,
) -> BulkFlushReport {
    let tasks: Vec<_> = devices
        .into_iter()
        .map(|device| {
            let name = device.name().to_string();
            let engine = engine.clone();
            let handle = tokio::spawn(async move { engine.run(device.as_ref()).await });
            (name, handle)
        })
        .collect();

    let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let reports = join_all(handles)
        .await
        .into_iter()
        .zip(names)
        .map(|(joined, name)| match joined {
            Ok(report) => report,
            Err(e) => setup_failed(FlushReport::new(&name), BcacheError::User(e.to_string())),
        })
        .collect();

    BulkFlushReport { reports }
}

impl BcacheHost {
    /// Flush one backing device, or all of them when `device` is `None`
    pub async fn flush(
        &self,
        registry: &DeviceRegistry,
        device: Option<&str>,
        cancel: CancellationToken,
    ) -> BcacheResult<BulkFlushReport> {
        let targets: Vec<&BackingDevice> = match device {
            Some(id) => vec![registry
                .backing(id)
                .ok_or_else(|| BcacheError::NotBacking(id.to_string()))?],
            None => registry.backing_devices().iter().collect(),
        };

        let controls = targets
            .into_iter()
            .map(|d| Arc::new(BoundDevice::new(self.clone(), d.clone())) as Arc<dyn DeviceControl>)
            .collect();

        let engine = FlushEngine::new(self.flush_policy(), cancel);
        Ok(flush_many(&engine, controls).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTree, CSET_A};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Device whose `state` turns clean after a given number of reads
    struct Scripted {
        name: String,
        values: Mutex<HashMap<String, String>>,
        clean_after: Option<u32>,
        state_reads: AtomicU32,
        failing_write: Option<(&'static str, &'static str)>,
        writes: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(name: &str, mode: &str, clean_after: Option<u32>) -> Self {
            let mut values = HashMap::new();
            values.insert(CACHE_MODE.to_string(), mode.to_string());
            values.insert(WRITEBACK_DELAY.to_string(), "30".to_string());
            Self {
                name: name.to_string(),
                values: Mutex::new(values),
                clean_after,
                state_reads: AtomicU32::new(0),
                failing_write: None,
                writes: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, tunable: &'static str, value: &'static str) -> Self {
            self.failing_write = Some((tunable, value));
            self
        }

        fn writes(&self) -> Vec<(String, String)> {
            self.writes.lock().unwrap().clone()
        }

        fn value(&self, name: &str) -> String {
            self.values.lock().unwrap()[name].clone()
        }
    }

    #[async_trait]
    impl DeviceControl for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn read(&self, parameter: &str) -> BcacheResult<String> {
            if parameter == STATE {
                let n = self.state_reads.fetch_add(1, Ordering::SeqCst) + 1;
                let clean = self.clean_after.is_some_and(|after| n >= after);
                return Ok(if clean { "clean" } else { "dirty" }.to_string());
            }
            Ok(self.value(parameter))
        }

        async fn write(&self, tunable: &str, value: &str) -> BcacheResult<()> {
            if self.failing_write == Some((tunable, value)) {
                return Err(BcacheError::User(format!("{} rejected {}", tunable, value)));
            }
            self.writes
                .lock()
                .unwrap()
                .push((tunable.to_string(), value.to_string()));
            self.values
                .lock()
                .unwrap()
                .insert(tunable.to_string(), value.to_string());
            Ok(())
        }
    }

    fn engine() -> FlushEngine {
        FlushEngine::new(
            PollPolicy::new(Duration::from_millis(1), 30),
            CancellationToken::new(),
        )
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn non_writeback_device_is_untouched() {
        let dev = Scripted::new("bcache0", "writethrough", None);
        let report = engine().run(&dev).await;

        assert!(report.is_success());
        assert!(matches!(report.drain, DrainOutcome::Skipped { .. }));
        assert!(dev.writes().is_empty());
        assert_eq!(report.history, vec![FlushState::Idle, FlushState::Done]);
    }

    #[tokio::test]
    async fn clean_drain_restores_settings() {
        let dev = Scripted::new("bcache0", "writeback", Some(3));
        let report = engine().run(&dev).await;

        assert!(report.is_success(), "{}", report.summary());
        assert!(matches!(report.drain, DrainOutcome::Clean { polls: 3 }));
        assert_eq!(
            dev.writes(),
            pairs(&[
                (WRITEBACK_DELAY, "1"),
                (CACHE_MODE, "writethrough"),
                (CACHE_MODE, "writeback"),
                (WRITEBACK_DELAY, "30"),
            ])
        );
        assert_eq!(
            report.history,
            vec![
                FlushState::Idle,
                FlushState::Draining,
                FlushState::Clean,
                FlushState::Restoring,
                FlushState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn timeout_fails_but_restores() {
        let dev = Scripted::new("bcache0", "writeback", None);
        let report = engine().run(&dev).await;

        assert!(!report.is_success());
        assert!(matches!(report.drain, DrainOutcome::TimedOut { polls: 30 }));
        assert!(matches!(report.restore_mode, RestoreOutcome::Restored));
        assert_eq!(dev.value(CACHE_MODE), "writeback");
        assert_eq!(dev.value(WRITEBACK_DELAY), "30");
        assert!(report.history.contains(&FlushState::TimedOut));
    }

    #[tokio::test]
    async fn first_write_failure_changes_nothing() {
        let dev = Scripted::new("bcache0", "writeback", Some(1)).failing(WRITEBACK_DELAY, "1");
        let report = engine().run(&dev).await;

        assert!(!report.is_success());
        assert!(matches!(report.drain, DrainOutcome::SetupFailed(_)));
        assert!(dev.writes().is_empty());
        assert_eq!(report.history, vec![FlushState::Idle, FlushState::Done]);
    }

    #[tokio::test]
    async fn second_write_failure_still_restores_delay() {
        let dev =
            Scripted::new("bcache0", "writeback", Some(1)).failing(CACHE_MODE, "writethrough");
        let report = engine().run(&dev).await;

        assert!(!report.is_success());
        assert!(matches!(report.restore_delay, RestoreOutcome::Restored));
        assert_eq!(dev.value(WRITEBACK_DELAY), "30");
        assert!(!report.history.contains(&FlushState::Draining));
        assert!(report.history.contains(&FlushState::Restoring));
    }

    #[tokio::test]
    async fn failed_restoration_is_partial_failure() {
        let dev = Scripted::new("bcache0", "writeback", Some(1)).failing(CACHE_MODE, "writeback");
        let report = engine().run(&dev).await;

        assert!(matches!(report.drain, DrainOutcome::Clean { polls: 1 }));
        assert!(report.restore_mode.is_failed());
        assert!(!report.is_success());
        assert!(report.summary().contains("restoring cache_mode failed"));
    }

    #[tokio::test]
    async fn cancellation_restores() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = FlushEngine::new(PollPolicy::new(Duration::from_millis(1), 30), cancel);
        let dev = Scripted::new("bcache0", "writeback", None);

        let report = engine.run(&dev).await;
        assert!(matches!(report.drain, DrainOutcome::Cancelled { polls: 0 }));
        assert_eq!(dev.value(CACHE_MODE), "writeback");
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn bulk_flush_names_failing_devices() {
        let devices: Vec<Arc<dyn DeviceControl>> = vec![
            Arc::new(Scripted::new("bcache0", "writeback", Some(2))),
            Arc::new(Scripted::new("bcache1", "writeback", None)),
            Arc::new(Scripted::new("bcache2", "none", None)),
        ];

        let bulk = flush_many(&engine(), devices).await;
        assert_eq!(bulk.reports.len(), 3);
        assert_eq!(bulk.failures(), vec!["bcache1"]);
        assert!(!bulk.is_success());

        let err = bulk.into_result().unwrap_err();
        assert!(matches!(err, BcacheError::FlushFailed(1, ref names) if names == "bcache1"));
    }

    #[tokio::test]
    async fn flushes_real_control_files() {
        let tree = FakeTree::new();
        tree.add_cache_set(CSET_A, "sdc", "8:32");
        tree.add_backing("bcache0", "sdb", "8:16", Some(CSET_A));
        tree.write("sys/block/sdb/bcache/state", "clean\n");
        let host = tree.host();
        let reg = host.registry().await.unwrap();

        let bulk = host
            .flush(&reg, Some("bcache0"), CancellationToken::new())
            .await
            .unwrap();
        assert!(bulk.is_success());
        assert_eq!(tree.read("sys/block/sdb/bcache/cache_mode"), "writeback");
        assert_eq!(tree.read("sys/block/sdb/bcache/writeback_delay"), "30");
        assert!(reg.backing("bcache0").unwrap().parameters.is_stale());
    }

    #[tokio::test]
    async fn flush_unknown_device_is_rejected() {
        let tree = FakeTree::new();
        let host = tree.host();
        let reg = host.registry().await.unwrap();

        let err = host
            .flush(&reg, Some("bcache5"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BcacheError::NotBacking(_)));
    }
}
