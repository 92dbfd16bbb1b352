//! Node inventory types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system family a node runs; selects the section commands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Linux,
    Macos,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Linux, Platform::Macos];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Platform of the machine running hydra.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" | "osx" => Ok(Platform::Macos),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

/// How commands reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Remote shell over `ssh`.
    #[default]
    Ssh,
    /// `sh -c` on the machine running hydra.
    Local,
}

/// One cluster member to collect from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Stable identifier, distinct from the network address.
    pub label: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub transport: Transport,
}

impl NodeDescriptor {
    pub fn new(label: impl Into<String>, host: impl Into<String>, platform: Platform) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            user: None,
            port: None,
            platform,
            transport: Transport::Ssh,
        }
    }

    /// The machine running hydra.
    pub fn local(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            host: "localhost".to_string(),
            user: None,
            port: None,
            platform: Platform::host(),
            transport: Transport::Local,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host identity as recorded in bundles (`user@host` or `host`).
    pub fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Built-in inventory used when no config file is found.
pub fn default_inventory() -> Vec<NodeDescriptor> {
    vec![NodeDescriptor::local("local")]
}
