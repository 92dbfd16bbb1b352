//! Configuration and data directory resolution.
//!
//! Config file order: CLI argument → `HYDRA_CONFIG` → `HYDRA_CONFIG_DIR` →
//! XDG config → /etc → built-in defaults.
//!
//! Data directory order: CLI argument → `store.data_dir` → `HYDRA_DATA_DIR` →
//! XDG data → `./hydra-data`.

use crate::settings::HydraConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    SystemConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

pub const ENV_CONFIG_PATH: &str = "HYDRA_CONFIG";
pub const ENV_CONFIG_DIR: &str = "HYDRA_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "HYDRA_DATA_DIR";

pub const CONFIG_FILENAME: &str = "hydra.json";
const APP_NAME: &str = "hydra";
const FALLBACK_DATA_DIR: &str = "hydra-data";

/// Resolve the config file path from the process environment.
///
/// An explicit CLI path is returned even when it does not exist, so the
/// loader can report it instead of silently falling back.
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    resolve_config_path_with(cli_path, |key| std::env::var(key).ok())
}

/// Same as [`resolve_config_path`] with an injectable environment lookup.
pub fn resolve_config_path_with(
    cli_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> (Option<PathBuf>, ConfigSource) {
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    if let Some(path) = env(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        return (Some(PathBuf::from(path)), ConfigSource::Environment);
    }

    if let Some(dir) = env(ENV_CONFIG_DIR).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(dir).join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        return (Some(system_path), ConfigSource::SystemConfig);
    }

    (None, ConfigSource::BuiltinDefault)
}

/// Resolve the data directory from the process environment.
pub fn resolve_data_dir(cli_dir: Option<&Path>, config: &HydraConfig) -> PathBuf {
    resolve_data_dir_with(cli_dir, config, |key| std::env::var(key).ok())
}

pub fn resolve_data_dir_with(
    cli_dir: Option<&Path>,
    config: &HydraConfig,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(dir) = cli_dir {
        return dir.to_path_buf();
    }
    if let Some(dir) = &config.store.data_dir {
        return dir.clone();
    }
    if let Some(dir) = env(ENV_DATA_DIR).filter(|p| !p.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
}

/// XDG config directory for hydra.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// System config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
