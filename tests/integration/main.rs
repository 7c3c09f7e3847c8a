//! Integration tests for bcachectl

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const CSET: &str = "cf85e0c3-cb0a-4c99-a003-b629adb0be0b";

    /// bcache0 on sdb, attached to a cache set on sdc
    struct Tree {
        _temp: TempDir,
        root: PathBuf,
        config: PathBuf,
    }

    impl Tree {
        fn new(cache_mode: &str) -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().canonicalize().unwrap();
            let tree = Self {
                config: root.join("config.toml"),
                root,
                _temp: temp,
            };

            tree.write("sys/fs/bcache/register", "");
            for (name, dev_id) in [("sdb", "8:16"), ("sdc", "8:32")] {
                tree.write(&format!("dev/{}", name), "");
                tree.link(&format!("dev/block/{}", dev_id), &format!("../{}", name));
                tree.write(&format!("sys/block/{}/dev", name), &format!("{}\n", dev_id));
            }

            let set = format!("sys/fs/bcache/{}", CSET);
            tree.write(&format!("{}/stop", set), "");
            tree.write(&format!("{}/congested_read_threshold_us", set), "2000\n");
            tree.write(&format!("{}/congested_write_threshold_us", set), "20000\n");
            tree.link(&format!("{}/cache0", set), "../../../block/sdc/bcache");
            tree.link("sys/block/sdc/bcache/set", &format!("../../../fs/bcache/{}", CSET));

            tree.write("dev/bcache0", "");
            let ctl = "sys/block/sdb/bcache";
            for (name, content) in [
                ("cache_mode", cache_mode),
                ("state", "clean\n"),
                ("writeback_delay", "30\n"),
                ("writeback_percent", "10\n"),
                ("writeback_rate", "4.0k\n"),
                ("sequential_cutoff", "4.0M\n"),
                ("dirty_data", "0.0k\n"),
                ("backing_dev_uuid", "1e2f0e9c-3b5b-4a9a-8c43-2b1f6d0e6a11\n"),
                ("attach", ""),
                ("detach", ""),
                ("stop", ""),
            ] {
                tree.write(&format!("{}/{}", ctl, name), content);
            }
            tree.link(&format!("{}/dev", ctl), "../../bcache0");
            tree.link(&format!("{}/set", ctl), &format!("../../../fs/bcache/{}", CSET));
            tree.link(&format!("{}/cache", ctl), &format!("../../../fs/bcache/{}", CSET));
            tree.link("sys/block/bcache0/bcache", "../sdb/bcache");
            tree.link("sys/block/bcache0/slaves/sdb", "../../sdb");

            let config = format!(
                "[general]\nrequire_root = false\n\n\
                 [timing]\npoll_interval_ms = 1\n\n\
                 [paths]\ndev_dir = {:?}\ndev_block_dir = {:?}\n\
                 sys_block_dir = {:?}\nsys_bcache_dir = {:?}\n\n\
                 [tools]\nsuper_show = \"/nonexistent/bcache-super-show\"\n",
                tree.path("dev"),
                tree.path("dev/block"),
                tree.path("sys/block"),
                tree.path("sys/fs/bcache"),
            );
            std::fs::write(&tree.config, config).unwrap();
            tree
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.join(rel)
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(self.path(rel)).unwrap()
        }

        fn link(&self, rel: &str, target: &str) {
            let path = self.path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            symlink(target, path).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = bcachectl();
            cmd.env_remove("RUST_LOG").arg("--config").arg(&self.config);
            cmd
        }
    }

    fn bcachectl() -> Command {
        cargo_bin_cmd!("bcachectl")
    }

    #[test]
    fn help_displays() {
        bcachectl()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("administration of bcache devices"));
    }

    #[test]
    fn version_displays() {
        bcachectl()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bcachectl"));
    }

    #[test]
    fn missing_config_fails() {
        bcachectl()
            .args(["--config", "/nonexistent/bcachectl.toml", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn module_not_loaded() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        std::fs::remove_dir_all(tree.path("sys/fs/bcache")).unwrap();

        tree.cmd()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("bcache is not loaded"))
            .stderr(predicate::str::contains("modprobe bcache"));
    }

    #[test]
    fn list_table() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("bcache devices:"))
            .stdout(predicate::str::contains("writethrough"))
            .stdout(predicate::str::contains(CSET));
    }

    #[test]
    fn list_json() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        let output = tree.cmd().args(["list", "-f", "json"]).output().unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["BcacheDevs"][0]["ShortName"], "bcache0");
        assert_eq!(json["CacheDevs"][0]["UUID"], CSET);
        assert_eq!(json["Failures"], serde_json::json!([]));
    }

    #[test]
    fn list_reports_unresolved_devices() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.link("dev/bcache9", "nowhere");

        tree.cmd()
            .arg("list")
            .assert()
            .failure()
            .stdout(predicate::str::contains("bcache0"))
            .stdout(predicate::str::contains("Unresolved devices:"))
            .stdout(predicate::str::contains("bcache9"))
            .stderr(predicate::str::contains("Could not resolve"));

        let output = tree.cmd().args(["list", "-f", "json"]).output().unwrap();
        assert!(!output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["BcacheDevs"][0]["ShortName"], "bcache0");
        assert!(json["Failures"][0]["Device"]
            .as_str()
            .unwrap()
            .ends_with("bcache9"));
    }

    #[test]
    fn list_short() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["list", "-f", "short"])
            .assert()
            .success()
            .stdout("bcache0\n");
    }

    #[test]
    fn show_device() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["show", "bcache0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ShortName:"))
            .stdout(predicate::str::contains(CSET));
    }

    #[test]
    fn show_unknown_device() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["show", "bcache7"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not appear to be a registered"));
    }

    #[test]
    fn tune_writes_encoded_value() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["tune", "bcache0", "sequential_cutoff:4m"])
            .assert()
            .success();

        assert_eq!(tree.read("sys/block/sdb/bcache/sequential_cutoff"), "4194304");
    }

    #[test]
    fn tune_rejects_unknown_tunable() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["tune", "bcache0", "dirty_data:0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not in allowed list"));

        assert_eq!(tree.read("sys/block/sdb/bcache/dirty_data"), "0.0k\n");
    }

    #[test]
    fn tune_from_file() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.write(
            "profile.toml",
            "[1e2f0e9c-3b5b-4a9a-8c43-2b1f6d0e6a11]\nwriteback_percent = 25\n",
        );

        tree.cmd()
            .args(["tune", "from-file"])
            .arg(tree.path("profile.toml"))
            .assert()
            .success();

        assert_eq!(tree.read("sys/block/sdb/bcache/writeback_percent"), "25");
    }

    #[test]
    fn print_tunables_to_file() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        let out = tree.path("tunables.toml");

        tree.cmd()
            .args(["print-tunables", "-o"])
            .arg(&out)
            .assert()
            .success();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("[1e2f0e9c-3b5b-4a9a-8c43-2b1f6d0e6a11]"));
        assert!(text.contains("writeback_percent"));
    }

    #[test]
    fn flush_writethrough_is_noop() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .args(["flush", "all"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to flush"));

        assert_eq!(
            tree.read("sys/block/sdb/bcache/cache_mode"),
            "[writethrough] writeback writearound none\n"
        );
    }

    #[test]
    fn flush_clean_writeback_restores_mode() {
        let tree = Tree::new("writethrough [writeback] writearound none\n");
        tree.cmd().args(["flush", "bcache0"]).assert().success();

        assert_eq!(tree.read("sys/block/sdb/bcache/cache_mode"), "writeback");
        assert_eq!(tree.read("sys/block/sdb/bcache/writeback_delay"), "30");
    }

    #[test]
    fn format_requires_a_device() {
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        tree.cmd()
            .arg("format")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing to format"));
    }

    #[test]
    fn root_required_by_default() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let tree = Tree::new("[writethrough] writeback writearound none\n");
        std::fs::write(&tree.config, "").unwrap();

        tree.cmd()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("require root privileges"));
    }
}
