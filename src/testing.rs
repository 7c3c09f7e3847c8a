//! Fake device trees for unit tests
//!
//! Lays out `dev/`, `dev/block/`, `sys/block/` and `sys/fs/bcache/` inside a
//! temporary directory with the same symlink structure the kernel uses.

use crate::config::schema::{PathsConfig, TimingConfig};
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::sysfs::Sysfs;
use crate::tools::{BcacheTools, FormatRequest, ToolOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const CSET_A: &str = "cf85e0c3-cb0a-4c99-a003-b629adb0be0b";
pub const CSET_B: &str = "577e54bb-23d3-4ef3-b5f4-749d3124ed0f";

pub struct FakeTree {
    _temp: TempDir,
    pub root: PathBuf,
}

impl FakeTree {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        for dir in ["dev/block", "sys/block", "sys/fs/bcache"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        std::fs::write(root.join("sys/fs/bcache/register"), "").unwrap();
        Self { _temp: temp, root }
    }

    pub fn paths(&self) -> PathsConfig {
        PathsConfig::rooted_at(&self.root)
    }

    pub fn sysfs(&self) -> Sysfs {
        Sysfs::new(self.paths())
    }

    /// Host with millisecond polling and the given tool stand-in
    pub fn host_with(&self, tools: FakeTools) -> BcacheHost {
        let timing = TimingConfig {
            poll_interval_ms: 1,
            ..TimingConfig::default()
        };
        BcacheHost::new(self.sysfs(), Arc::new(tools), timing)
    }

    pub fn host(&self) -> BcacheHost {
        self.host_with(FakeTools::default())
    }

    /// Host that leaves a spawned "kernel" task time to react between polls
    pub fn slow_host(&self) -> BcacheHost {
        let timing = TimingConfig {
            poll_interval_ms: 50,
            ..TimingConfig::default()
        };
        BcacheHost::new(self.sysfs(), Arc::new(FakeTools::default()), timing)
    }

    /// Wait until `rel` holds `content`, then run `react`, like the kernel would
    pub fn on_write(
        &self,
        rel: &str,
        content: &str,
        react: impl FnOnce(&Path) + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        let path = self.path(rel);
        let root = self.root.clone();
        let content = content.to_string();
        tokio::spawn(async move {
            for _ in 0..2000 {
                if std::fs::read_to_string(&path).is_ok_and(|c| c == content) {
                    react(&root);
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn link(&self, rel: &str, target: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        symlink(target, path).unwrap();
    }

    /// A plain block device with its `/dev` node and `major:minor` link
    pub fn add_raw_device(&self, name: &str, dev_id: &str) {
        self.write(&format!("dev/{}", name), "");
        self.link(&format!("dev/block/{}", dev_id), &format!("../{}", name));
        self.write(&format!("sys/block/{}/dev", name), &format!("{}\n", dev_id));
    }

    /// A registered cache set whose `cache0` is `cache_dev`
    pub fn add_cache_set(&self, uuid: &str, cache_dev: &str, dev_id: &str) {
        self.add_raw_device(cache_dev, dev_id);
        let set = format!("sys/fs/bcache/{}", uuid);
        self.write(&format!("{}/stop", set), "");
        self.write(&format!("{}/congested_read_threshold_us", set), "2000\n");
        self.write(&format!("{}/congested_write_threshold_us", set), "20000\n");
        self.link(
            &format!("{}/cache0", set),
            &format!("../../../block/{}/bcache", cache_dev),
        );
        self.link(
            &format!("sys/block/{}/bcache/set", cache_dev),
            &format!("../../../fs/bcache/{}", uuid),
        );
    }

    /// A registered backing device `short` built on `slave`, optionally attached
    pub fn add_backing(&self, short: &str, slave: &str, dev_id: &str, cset: Option<&str>) {
        self.add_raw_device(slave, dev_id);
        self.write(&format!("dev/{}", short), "");

        let ctl = format!("sys/block/{}/bcache", slave);
        let files = [
            ("cache_mode", "writethrough [writeback] writearound none\n"),
            ("state", "dirty\n"),
            ("writeback_delay", "30\n"),
            ("writeback_percent", "10\n"),
            ("writeback_rate", "4.0k\n"),
            ("sequential_cutoff", "4.0M\n"),
            ("dirty_data", "1.2M\n"),
            ("readahead_cache_policy", "[all] meta-only\n"),
            ("backing_dev_uuid", "1e2f0e9c-3b5b-4a9a-8c43-2b1f6d0e6a11\n"),
            ("stats_total/cache_hits", "42\n"),
            ("attach", ""),
            ("detach", ""),
            ("stop", ""),
        ];
        for (name, content) in files {
            self.write(&format!("{}/{}", ctl, name), content);
        }
        self.link(&format!("{}/dev", ctl), &format!("../../{}", short));
        if let Some(uuid) = cset {
            self.attach_link(slave, uuid);
        }

        self.link(&format!("sys/block/{}/bcache", short), &format!("../{}/bcache", slave));
        self.link(
            &format!("sys/block/{}/slaves/{}", short, slave),
            &format!("../../{}", slave),
        );
    }

    /// What the kernel does on a successful attach
    pub fn attach_link(&self, slave: &str, uuid: &str) {
        let ctl = format!("sys/block/{}/bcache", slave);
        self.link(&format!("{}/set", ctl), &format!("../../../fs/bcache/{}", uuid));
        self.link(&format!("{}/cache", ctl), &format!("../../../fs/bcache/{}", uuid));
    }

    /// What the kernel does once a detach completes
    pub fn detach_link(&self, slave: &str) {
        let ctl = format!("sys/block/{}/bcache", slave);
        let _ = std::fs::remove_file(self.path(&format!("{}/set", ctl)));
        let _ = std::fs::remove_file(self.path(&format!("{}/cache", ctl)));
    }
}

/// Scripted stand-in for the bcache-tools programs
#[derive(Default)]
pub struct FakeTools {
    pub superblocks: HashMap<PathBuf, String>,
    pub make_bcache_output: Option<ToolOutput>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTools {
    pub fn with_superblock(mut self, device: &Path, text: &str) -> Self {
        self.superblocks.insert(device.to_path_buf(), text.to_string());
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BcacheTools for FakeTools {
    async fn super_show(&self, device: &Path) -> BcacheResult<String> {
        self.record(format!("super_show {}", device.display()));
        self.superblocks
            .get(device)
            .cloned()
            .ok_or_else(|| BcacheError::command_exec("bcache-super-show", "not a bcache device"))
    }

    async fn make_bcache(&self, request: &FormatRequest) -> BcacheResult<ToolOutput> {
        self.record(format!("make-bcache {}", request.make_bcache_args().join(" ")));
        Ok(self.make_bcache_output.clone().unwrap_or(ToolOutput {
            success: true,
            output: String::new(),
        }))
    }

    async fn wipefs(&self, device: &Path) -> BcacheResult<ToolOutput> {
        self.record(format!("wipefs -a {}", device.display()));
        Ok(ToolOutput {
            success: true,
            output: String::new(),
        })
    }
}
