//! The environment every operation runs against

use crate::config::schema::TimingConfig;
use crate::config::Config;
use crate::error::{BcacheError, BcacheResult};
use crate::poll::PollPolicy;
use crate::sysfs::Sysfs;
use crate::tools::{BcacheTools, SystemTools};
use std::sync::Arc;

/// sysfs roots, external tools and polling bounds.
///
/// Cheap to clone so per-device tasks can own a copy.
#[derive(Clone)]
pub struct BcacheHost {
    sysfs: Sysfs,
    tools: Arc<dyn BcacheTools>,
    timing: TimingConfig,
}

impl BcacheHost {
    pub fn new(sysfs: Sysfs, tools: Arc<dyn BcacheTools>, timing: TimingConfig) -> Self {
        Self {
            sysfs,
            tools,
            timing,
        }
    }

    /// Host backed by the real programs named in the configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Sysfs::new(config.paths.clone()),
            Arc::new(SystemTools::new(config.tools.clone())),
            config.timing,
        )
    }

    pub fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }

    pub fn tools(&self) -> &dyn BcacheTools {
        self.tools.as_ref()
    }

    pub fn register_policy(&self) -> PollPolicy {
        PollPolicy::new(self.timing.poll_interval(), self.timing.register_polls)
    }

    pub fn stop_policy(&self) -> PollPolicy {
        PollPolicy::new(self.timing.poll_interval(), self.timing.stop_polls)
    }

    pub fn flush_policy(&self) -> PollPolicy {
        PollPolicy::new(self.timing.poll_interval(), self.timing.flush_polls)
    }

    /// Fail unless the bcache module has published its sysfs root
    pub async fn ensure_loaded(&self) -> BcacheResult<()> {
        let root = self.sysfs.bcache_root();
        if self.sysfs.exists(root).await {
            Ok(())
        } else {
            Err(BcacheError::ModuleNotLoaded(root.to_path_buf()))
        }
    }
}
