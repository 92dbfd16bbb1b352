//! Config file loading integration tests.
//!
//! Exercises full documents on disk: defaults, command overrides, and the
//! load-time rejections that must stop a run before any node is contacted.

use hydra_bundle::SectionName;
use hydra_config::{
    load_config_with, CommandEntry, ConfigError, ConfigOptions, ConfigSource, Platform, Transport,
    ValidationError,
};
use std::path::PathBuf;

fn no_env(_: &str) -> Option<String> {
    None
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("hydra.json");
    std::fs::write(&path, body).unwrap();
    path
}

fn load(path: PathBuf) -> Result<hydra_config::ResolvedConfig, ConfigError> {
    load_config_with(
        &ConfigOptions {
            config_path: Some(path),
        },
        no_env,
    )
}

// ============================================================================
// Full documents
// ============================================================================

#[test]
fn homelab_inventory_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "schema_version": "1.0.0",
            "generator_id": "hydra-cron@nas",
            "nodes": [
                {"label": "gpu-box", "host": "10.0.0.21", "user": "ops"},
                {"label": "mac-mini", "host": "10.0.0.40", "user": "admin", "platform": "macos", "port": 2222},
                {"label": "local", "host": "localhost", "transport": "local"}
            ],
            "ssh": {"connect_timeout_secs": 10, "identity_file": "/home/ops/.ssh/id_ed25519"},
            "collection": {"parallel_nodes": 2},
            "store": {"data_dir": "/srv/hydra", "retention": {"keep_last": 30, "max_age_days": 180}},
            "commands": {
                "linux": {"GPU": "rocm-smi --showproductname"},
                "macos": {"DOCKER_COMPOSE": null}
            }
        }"#,
    );

    let resolved = load(path).expect("load homelab config");
    let config = &resolved.config;
    assert_eq!(resolved.source, ConfigSource::CliArgument);
    assert_eq!(config.nodes.len(), 3);
    assert_eq!(config.node("mac-mini").unwrap().platform, Platform::Macos);
    assert_eq!(config.node("mac-mini").unwrap().port, Some(2222));
    assert_eq!(config.node("local").unwrap().transport, Transport::Local);
    assert_eq!(config.ssh.command_timeout_secs, 120);
    assert_eq!(config.store.retention.keep_last, Some(30));

    let table = &resolved.commands;
    assert_eq!(
        table.lookup(SectionName::Gpu, Platform::Linux).command(),
        Some("rocm-smi --showproductname")
    );
    assert_eq!(
        table.lookup(SectionName::DockerCompose, Platform::Macos),
        &CommandEntry::Unsupported
    );
    assert!(table.lookup(SectionName::DockerCompose, Platform::Linux).is_supported());
}

#[test]
fn empty_document_uses_builtin_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let resolved = load(write_config(&dir, "{}")).unwrap();
    assert_eq!(resolved.config.nodes.len(), 1);
    assert_eq!(resolved.config.nodes[0].label, "local");
    assert!(resolved.sha256.is_some());
}

// ============================================================================
// Load-time rejections
// ============================================================================

#[test]
fn unknown_section_in_overrides_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{"commands": {"linux": {"FIREWALL": "nft list ruleset"}}}"#);
    assert!(matches!(load(path), Err(ConfigError::ParseError { .. })));
}

#[test]
fn unknown_platform_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{"nodes": [{"label": "win", "host": "10.0.0.9", "platform": "windows"}]}"#,
    );
    assert!(matches!(load(path), Err(ConfigError::ParseError { .. })));
}

#[test]
fn blank_override_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{"commands": {"macos": {"PORTS": ""}}}"#);
    match load(path) {
        Err(ConfigError::ValidationError(ValidationError::InvalidValue { field, .. })) => {
            assert_eq!(field, "commands.macos.PORTS");
        }
        other => panic!("expected invalid override, got {:?}", other),
    }
}

#[test]
fn duplicate_labels_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{"nodes": [
            {"label": "nas", "host": "10.0.0.30"},
            {"label": "nas", "host": "10.0.0.31"}
        ]}"#,
    );
    assert!(matches!(
        load(path),
        Err(ConfigError::ValidationError(ValidationError::SemanticError(_)))
    ));
}

#[test]
fn empty_inventory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{"nodes": []}"#);
    assert!(matches!(
        load(path),
        Err(ConfigError::ValidationError(ValidationError::MissingField(_)))
    ));
}
