//! Configuration provenance.
//!
//! Records which file a run was configured from and its content hash, so a
//! bundle can be traced back to the exact inventory that produced it.

use crate::resolve::ConfigSource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Path the config was read from (None for built-in defaults).
    pub path: Option<PathBuf>,

    /// SHA-256 of the file content (None for built-in defaults).
    pub sha256: Option<String>,

    pub source: ConfigSource,

    pub schema_version: String,

    pub node_count: usize,
}

impl ConfigSnapshot {
    /// Short form of the hash for log lines.
    pub fn short_hash(&self) -> &str {
        match &self.sha256 {
            Some(hash) => &hash[..hash.len().min(12)],
            None => "builtin",
        }
    }
}

/// Hex-encoded SHA-256 of `content`.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
