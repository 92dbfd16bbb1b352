//! Configuration loading.

use crate::commands::SectionCommandTable;
use crate::resolve::{resolve_config_path, resolve_config_path_with, ConfigSource};
use crate::settings::HydraConfig;
use crate::snapshot::{hash_content, ConfigSnapshot};
use crate::validate::{validate_config, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Loaded, validated configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: HydraConfig,
    pub commands: SectionCommandTable,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    pub sha256: Option<String>,
}

impl ResolvedConfig {
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            path: self.path.clone(),
            sha256: self.sha256.clone(),
            source: self.source,
            schema_version: self.config.schema_version.clone(),
            node_count: self.config.nodes.len(),
        }
    }
}

/// Load configuration with the standard resolution order and validate it.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let (path, source) = resolve_config_path(options.config_path.as_deref());
    load_resolved(path, source)
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with(
    options: &ConfigOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let (path, source) = resolve_config_path_with(options.config_path.as_deref(), env);
    load_resolved(path, source)
}

fn load_resolved(
    path: Option<PathBuf>,
    source: ConfigSource,
) -> Result<ResolvedConfig, ConfigError> {
    let (config, sha256) = match &path {
        Some(path) => {
            let (config, hash) = load_config_file(path)?;
            (config, Some(hash))
        }
        None => (HydraConfig::default(), None),
    };

    let commands = validate_config(&config)?;
    debug!(
        source = %source,
        path = ?path,
        nodes = config.nodes.len(),
        "configuration loaded"
    );

    Ok(ResolvedConfig {
        config,
        commands,
        path,
        source,
        sha256,
    })
}

/// Read and deserialize one config file, returning it with its content hash.
pub fn load_config_file(path: &Path) -> Result<(HydraConfig, String), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let hash = hash_content(&content);
    let config: HydraConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let options = ConfigOptions {
            config_path: Some(PathBuf::from("/nonexistent/hydra.json")),
        };
        let err = load_config_with(&options, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn explicit_file_is_hashed_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydra.json");
        std::fs::write(
            &path,
            r#"{"nodes": [{"label": "nas", "host": "10.0.0.30", "user": "root"}]}"#,
        )
        .unwrap();

        let options = ConfigOptions {
            config_path: Some(path.clone()),
        };
        let resolved = load_config_with(&options, no_env).unwrap();
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path.as_deref(), Some(path.as_path()));
        assert_eq!(resolved.sha256.as_ref().map(String::len), Some(64));
        assert_eq!(resolved.snapshot().node_count, 1);
    }

    #[test]
    fn invalid_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydra.json");
        std::fs::write(&path, "{ not json").unwrap();
        let options = ConfigOptions {
            config_path: Some(path),
        };
        assert!(matches!(
            load_config_with(&options, no_env),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn semantic_failure_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydra.json");
        std::fs::write(&path, r#"{"collection": {"parallel_nodes": 0}}"#).unwrap();
        let options = ConfigOptions {
            config_path: Some(path),
        };
        assert!(matches!(
            load_config_with(&options, no_env),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
