//! Configuration validation errors and semantic validation.

use crate::commands::SectionCommandTable;
use crate::settings::{HydraConfig, MIN_RETAINED};
use std::collections::HashSet;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SchemaError(_) => 62,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate a configuration and build its command table.
///
/// Runs before any node is contacted; a failure here aborts the run.
pub fn validate_config(config: &HydraConfig) -> ValidationResult<SectionCommandTable> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    let generator = config.generator_id.as_str();
    if generator.trim().is_empty() {
        return Err(ValidationError::MissingField("generator_id".to_string()));
    }
    if generator.contains(['|', '\n', '\r']) || generator.trim() != generator {
        return Err(invalid(
            "generator_id",
            "must be a single line without '|' or edge whitespace",
        ));
    }

    validate_nodes(config)?;

    positive("ssh.connect_timeout_secs", config.ssh.connect_timeout_secs)?;
    positive("ssh.command_timeout_secs", config.ssh.command_timeout_secs)?;
    for (i, opt) in config.ssh.options.iter().enumerate() {
        if opt.trim().is_empty() {
            return Err(invalid(&format!("ssh.options[{}]", i), "must not be empty"));
        }
    }

    positive("collection.max_lines", config.collection.max_lines as u64)?;
    positive(
        "collection.max_output_bytes",
        config.collection.max_output_bytes as u64,
    )?;
    positive(
        "collection.parallel_nodes",
        config.collection.parallel_nodes as u64,
    )?;

    positive("store.lock_lease_secs", config.store.lock_lease_secs)?;
    if let Some(keep) = config.store.retention.keep_last {
        if keep < MIN_RETAINED {
            return Err(invalid(
                "store.retention.keep_last",
                &format!("must be at least {}, got {}", MIN_RETAINED, keep),
            ));
        }
    }
    if config.store.retention.max_age_days == Some(0) {
        return Err(invalid("store.retention.max_age_days", "must be positive"));
    }

    SectionCommandTable::with_overrides(&config.commands)
}

fn validate_nodes(config: &HydraConfig) -> ValidationResult<()> {
    if config.nodes.is_empty() {
        return Err(ValidationError::MissingField("nodes".to_string()));
    }

    let mut seen = HashSet::new();
    for (i, node) in config.nodes.iter().enumerate() {
        let field = format!("nodes[{}]", i);
        if node.label.is_empty() {
            return Err(ValidationError::MissingField(format!("{}.label", field)));
        }
        if !node
            .label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(invalid(
                &format!("{}.label", field),
                &format!("'{}' may only contain [A-Za-z0-9._-]", node.label),
            ));
        }
        if !seen.insert(node.label.as_str()) {
            return Err(ValidationError::SemanticError(format!(
                "duplicate node label '{}'",
                node.label
            )));
        }

        if node.host.is_empty() {
            return Err(ValidationError::MissingField(format!("{}.host", field)));
        }
        check_address_part(&format!("{}.host", field), &node.host)?;
        if let Some(user) = &node.user {
            if user.is_empty() {
                return Err(invalid(&format!("{}.user", field), "must not be empty"));
            }
            check_address_part(&format!("{}.user", field), user)?;
        }
        if node.port == Some(0) {
            return Err(invalid(&format!("{}.port", field), "must be positive"));
        }
    }
    Ok(())
}

fn check_address_part(field: &str, value: &str) -> ValidationResult<()> {
    if value.contains(['|', '=']) || value.chars().any(char::is_whitespace) {
        return Err(invalid(
            field,
            &format!("'{}' must not contain '|', '=' or whitespace", value),
        ));
    }
    Ok(())
}

fn positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(invalid(field, "must be positive"));
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
