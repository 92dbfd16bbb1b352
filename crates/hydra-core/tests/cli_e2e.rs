//! CLI end-to-end tests for the hydra binary.
//!
//! Every test points `--config` and `--data-dir` at a temp directory so the
//! host's own configuration is never read.

use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use hydra_bundle::{serialize, BundleBuilder, NodeSnapshot, Section, SectionName};
use predicates::prelude::*;
use std::path::{Path, PathBuf};

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        std::fs::write(
            ws.config_path(),
            r#"{"nodes": [{"label": "nas", "host": "10.0.0.30", "user": "root"}]}"#,
        )
        .expect("write config");
        ws
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("hydra.json")
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn snapshots(&self) -> PathBuf {
        self.data_dir().join("snapshots")
    }

    fn hydra(&self) -> Command {
        let mut cmd = Command::cargo_bin("hydra").expect("hydra binary should exist");
        cmd.env_remove("HYDRA_CONFIG")
            .env_remove("HYDRA_CONFIG_DIR")
            .env_remove("HYDRA_DATA_DIR")
            .env("HYDRA_LOG", "error")
            .arg("--config")
            .arg(self.config_path())
            .arg("--data-dir")
            .arg(self.data_dir());
        cmd
    }

    /// Store a bundle with one node whose PORTS section holds `ports`.
    fn store_bundle(&self, hour: u32, ports: &str) -> String {
        let ts = Utc
            .with_ymd_and_hms(2026, 10, 1, hour, 0, 0)
            .single()
            .expect("valid time");
        let mut node = NodeSnapshot::new("nas", "root@10.0.0.30");
        node.insert_section(Section::from_output(
            SectionName::Ports,
            "ss -tulnH",
            ports,
            0,
            100,
        ));
        let mut builder = BundleBuilder::new("hydra-test").with_timestamp(ts);
        builder.add_node(node).expect("add node");
        let bundle = builder.build().expect("build");

        let id = format!("snapshot-20261001-{:02}0000-000.txt", hour);
        write(&self.snapshots().join(&id), &serialize(&bundle));
        id
    }

    fn report_count(&self) -> usize {
        std::fs::read_dir(self.data_dir().join("reports"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, content).expect("write");
}

fn strip_generated(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .lines()
        .filter(|l| !l.starts_with("Generated: "))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// drift
// ============================================================================

#[test]
fn drift_on_empty_store_is_insufficient_data() {
    let ws = Workspace::new();
    ws.hydra()
        .arg("drift")
        .assert()
        .success()
        .stdout(predicate::str::contains("**Status: Insufficient data**"))
        .stdout(predicate::str::contains("Found 0 snapshot(s)"));
    assert_eq!(ws.report_count(), 1);
}

#[test]
fn drift_with_one_bundle_is_insufficient_data() {
    let ws = Workspace::new();
    ws.store_bundle(3, "80\n443");
    ws.hydra()
        .args(["drift", "--format", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("insufficient data (1 snapshot(s) stored)"));
}

#[test]
fn drift_reports_added_port() {
    let ws = Workspace::new();
    let from = ws.store_bundle(3, "80\n443");
    let to = ws.store_bundle(4, "80\n443\n8080");

    ws.hydra()
        .arg("drift")
        .assert()
        .success()
        .stdout(predicate::str::contains("## nas / PORTS"))
        .stdout(predicate::str::contains("```text\n8080\n```"))
        .stdout(predicate::str::contains(from.as_str()))
        .stdout(predicate::str::contains(to.as_str()))
        .stdout(predicate::str::contains("## Recommended Actions"));
}

#[test]
fn drift_json_output() {
    let ws = Workspace::new();
    ws.store_bundle(3, "80");
    ws.store_bundle(4, "80");

    let output = ws
        .hydra()
        .args(["drift", "--format", "json"])
        .output()
        .expect("run hydra");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(json["status"], "compared");
    assert_eq!(json["changes"].as_array().map(Vec::len), Some(0));
}

#[test]
fn repeated_drift_runs_match_except_timestamp() {
    let ws = Workspace::new();
    ws.store_bundle(3, "80\n443");
    ws.store_bundle(4, "22\n443");

    let first = ws.hydra().arg("drift").output().expect("first run");
    let second = ws.hydra().arg("drift").output().expect("second run");
    assert!(first.status.success() && second.status.success());
    assert_eq!(strip_generated(&first.stdout), strip_generated(&second.stdout));
    assert_eq!(ws.report_count(), 2);
}

#[test]
fn malformed_bundle_exits_with_bundle_error() {
    let ws = Workspace::new();
    ws.store_bundle(3, "80");
    write(
        &ws.snapshots().join("snapshot-20261001-040000-000.txt"),
        "HYDRA_SNAPSHOT_BUNDLE|version=1|timestamp=2026-10-01T04:00:00Z|generator=x\n\
         =====BEGIN NODE|label=nas|target=root@10.0.0.30=====\n",
    );

    ws.hydra()
        .arg("drift")
        .assert()
        .code(15)
        .stderr(predicate::str::contains("malformed"));
    assert_eq!(ws.report_count(), 0);
}

// ============================================================================
// check / list / prune / completions
// ============================================================================

#[test]
fn check_reports_coverage() {
    let ws = Workspace::new();
    ws.hydra()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("**Status: OK**"))
        .stdout(predicate::str::contains("`nas` root@10.0.0.30"))
        .stdout(predicate::str::contains("macos: 15 supported"));
}

#[test]
fn check_rejects_invalid_config() {
    let ws = Workspace::new();
    std::fs::write(
        ws.config_path(),
        r#"{"nodes": [{"label": "a", "host": "h1"}, {"label": "a", "host": "h2"}]}"#,
    )
    .expect("write config");

    ws.hydra()
        .arg("check")
        .assert()
        .code(11)
        .stderr(predicate::str::contains("duplicate node label"));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let ws = Workspace::new();
    std::fs::remove_file(ws.config_path()).expect("remove config");
    ws.hydra().arg("check").assert().code(11);
}

#[test]
fn list_is_newest_first() {
    let ws = Workspace::new();
    ws.store_bundle(3, "80");
    ws.store_bundle(5, "80");

    let output = ws
        .hydra()
        .args(["list", "--format", "json"])
        .output()
        .expect("run hydra");
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(json[0]["id"], "snapshot-20261001-050000-000.txt");
    assert_eq!(json[1]["id"], "snapshot-20261001-030000-000.txt");
}

#[test]
fn prune_dry_run_keeps_files() {
    let ws = Workspace::new();
    std::fs::write(
        ws.config_path(),
        r#"{"nodes": [{"label": "nas", "host": "10.0.0.30"}],
            "store": {"retention": {"keep_last": 2}}}"#,
    )
    .expect("write config");
    for hour in 1..=4 {
        ws.store_bundle(hour, "80");
    }

    ws.hydra()
        .args(["prune", "--dry-run", "--format", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would prune 2 artifact(s)"));
    assert_eq!(std::fs::read_dir(ws.snapshots()).expect("dir").count(), 4);
}

#[test]
fn collect_unknown_node_is_an_args_error() {
    let ws = Workspace::new();
    ws.hydra()
        .args(["collect", "--node", "ghost"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn completions_for_bash() {
    Command::cargo_bin("hydra")
        .expect("hydra binary should exist")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hydra"));
}
