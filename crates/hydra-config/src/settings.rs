//! Typed configuration document (`hydra.json`).
//!
//! Every section is optional; missing fields take the serde defaults below.

use crate::commands::CommandOverrides;
use crate::inventory::{default_inventory, NodeDescriptor};
use hydra_bundle::MAX_SECTION_LINES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Retention never keeps fewer bundles than this; drift needs two.
pub const MIN_RETAINED: usize = 2;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydraConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Identity written into every bundle header.
    #[serde(default = "default_generator_id")]
    pub generator_id: String,

    #[serde(default = "default_inventory")]
    pub nodes: Vec<NodeDescriptor>,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub collection: CollectionSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default, skip_serializing_if = "CommandOverrides::is_empty")]
    pub commands: CommandOverrides,
}

impl Default for HydraConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            generator_id: default_generator_id(),
            nodes: default_inventory(),
            ssh: SshSettings::default(),
            collection: CollectionSettings::default(),
            store: StoreSettings::default(),
            commands: CommandOverrides::new(),
        }
    }
}

impl HydraConfig {
    pub fn node(&self, label: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.label == label)
    }
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_generator_id() -> String {
    format!("hydra/{}", env!("CARGO_PKG_VERSION"))
}

/// SSH transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall wall-clock limit per remote command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,

    /// Extra `-o` options passed verbatim.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            identity_file: None,
            options: Vec::new(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_command_timeout() -> u64 {
    120
}

/// Collection-time output policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Per-stream capture cap while a command runs.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Nodes collected concurrently; sections within a node stay sequential.
    #[serde(default = "default_parallel_nodes")]
    pub parallel_nodes: usize,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_output_bytes: default_max_output_bytes(),
            parallel_nodes: default_parallel_nodes(),
        }
    }
}

fn default_max_lines() -> usize {
    MAX_SECTION_LINES
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_parallel_nodes() -> usize {
    1
}

/// Snapshot store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Age after which an abandoned lock is broken.
    #[serde(default = "default_lock_lease")]
    pub lock_lease_secs: u64,

    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            lock_lease_secs: default_lock_lease(),
            retention: RetentionPolicy::default(),
        }
    }
}

fn default_lock_lease() -> u64 {
    3600
}

/// Artifact retention for the store.
///
/// `None` disables a rule. Both rules apply to bundles and reports
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_keep_last")]
    pub keep_last: Option<usize>,

    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            max_age_days: None,
        }
    }
}

impl RetentionPolicy {
    /// A policy that never deletes anything.
    pub fn keep_all() -> Self {
        Self {
            keep_last: None,
            max_age_days: None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.keep_last.is_none() && self.max_age_days.is_none()
    }
}

fn default_keep_last() -> Option<usize> {
    Some(90)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Transport;

    #[test]
    fn empty_document_takes_defaults() {
        let config: HydraConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HydraConfig::default());
        assert_eq!(config.ssh.connect_timeout_secs, 15);
        assert_eq!(config.collection.max_lines, 100);
        assert_eq!(config.store.retention.keep_last, Some(90));
        assert_eq!(config.nodes[0].transport, Transport::Local);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{
            "ssh": {"connect_timeout_secs": 5},
            "store": {"retention": {"max_age_days": 30}}
        }"#;
        let config: HydraConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ssh.connect_timeout_secs, 5);
        assert_eq!(config.ssh.command_timeout_secs, 120);
        assert_eq!(config.store.retention.keep_last, Some(90));
        assert_eq!(config.store.retention.max_age_days, Some(30));
        assert_eq!(config.store.lock_lease_secs, 3600);
    }

    #[test]
    fn explicit_null_keep_last_disables_count_rule() {
        let policy: RetentionPolicy = serde_json::from_str(r#"{"keep_last": null}"#).unwrap();
        assert!(policy.is_unbounded());
    }
}
