//! hydra configuration loading and validation.
//!
//! This crate provides:
//! - The node inventory and platform variants
//! - The section command table, complete for every (section, platform) pair
//! - SSH, collection and store settings with serde defaults
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation and provenance snapshots

pub mod commands;
pub mod inventory;
pub mod load;
pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use commands::{summary_command, CommandEntry, CommandOverrides, SectionCommandTable};
pub use inventory::{default_inventory, NodeDescriptor, Platform, Transport};
pub use load::{
    load_config, load_config_file, load_config_with, ConfigError, ConfigOptions, ResolvedConfig,
};
pub use resolve::{
    resolve_config_path, resolve_config_path_with, resolve_data_dir, resolve_data_dir_with,
    ConfigSource,
};
pub use settings::{
    CollectionSettings, HydraConfig, RetentionPolicy, SshSettings, StoreSettings, MIN_RETAINED,
};
pub use snapshot::{hash_content, ConfigSnapshot};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
