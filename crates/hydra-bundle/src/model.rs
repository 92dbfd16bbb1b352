//! Snapshot data model.
//!
//! A [`SnapshotBundle`] is created once at collection time and never mutated
//! afterwards; a newer bundle supersedes it. Each bundle holds one
//! [`NodeSnapshot`] per cluster member, and each node holds one [`Section`]
//! per enumerated [`SectionName`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Bundle text format version understood by this crate.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Maximum number of captured output lines kept per section.
pub const MAX_SECTION_LINES: usize = 100;

/// Maximum number of characters kept for the `CMD:` line.
pub const MAX_COMMAND_CHARS: usize = 160;

/// Exit code recorded when a section has no command for the node's platform.
pub const EXIT_UNSUPPORTED: i32 = -1;

/// Exit code recorded when a section command exceeded its timeout.
pub const EXIT_TIMED_OUT: i32 = 124;

/// Exit code recorded when a section command could not be started.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Exit code recorded for every section of a node that could not be reached.
pub const EXIT_UNREACHABLE: i32 = 255;

/// Summary keys in the order they are written.
pub const SUMMARY_KEYS: [&str; 8] = [
    "hostname",
    "os",
    "version",
    "kernel",
    "cpu",
    "cores",
    "ram_total",
    "uptime",
];

/// Line prefixes reserved by the block grammar.
pub(crate) const RESERVED_PREFIXES: [&str; 4] = [
    "-----BEGIN ",
    "-----END ",
    "=====BEGIN NODE",
    "=====END NODE",
];

/// The fixed set of collected fact categories.
///
/// Declaration order is the collection and report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionName {
    OsIdentity,
    Uptime,
    Cpu,
    Ram,
    Disks,
    Df,
    Network,
    Dns,
    Ports,
    Services,
    DockerVersion,
    DockerPs,
    DockerCompose,
    Gpu,
    LspciGpu,
    NfsMounts,
    ZfsStatus,
}

impl SectionName {
    /// All sections in enumeration order.
    pub const ALL: [SectionName; 17] = [
        SectionName::OsIdentity,
        SectionName::Uptime,
        SectionName::Cpu,
        SectionName::Ram,
        SectionName::Disks,
        SectionName::Df,
        SectionName::Network,
        SectionName::Dns,
        SectionName::Ports,
        SectionName::Services,
        SectionName::DockerVersion,
        SectionName::DockerPs,
        SectionName::DockerCompose,
        SectionName::Gpu,
        SectionName::LspciGpu,
        SectionName::NfsMounts,
        SectionName::ZfsStatus,
    ];

    /// Wire name as it appears in `BEGIN`/`END` markers.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::OsIdentity => "OS_IDENTITY",
            SectionName::Uptime => "UPTIME",
            SectionName::Cpu => "CPU",
            SectionName::Ram => "RAM",
            SectionName::Disks => "DISKS",
            SectionName::Df => "DF",
            SectionName::Network => "NETWORK",
            SectionName::Dns => "DNS",
            SectionName::Ports => "PORTS",
            SectionName::Services => "SERVICES",
            SectionName::DockerVersion => "DOCKER_VERSION",
            SectionName::DockerPs => "DOCKER_PS",
            SectionName::DockerCompose => "DOCKER_COMPOSE",
            SectionName::Gpu => "GPU",
            SectionName::LspciGpu => "LSPCI_GPU",
            SectionName::NfsMounts => "NFS_MOUNTS",
            SectionName::ZfsStatus => "ZFS_STATUS",
        }
    }

    /// Position in [`SectionName::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown section: {}", s))
    }
}

/// One collected fact category for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: SectionName,
    /// Single-line command text that produced the output.
    pub command: String,
    /// Captured output, lines joined with `\n`, no trailing newline.
    pub raw_text: String,
    /// Exit status; non-zero is informational and never invalidates the section.
    pub exit_code: i32,
}

impl Section {
    /// Build a section from captured command output.
    ///
    /// Keeps at most `max_lines` lines, strips line terminators, and prefixes
    /// any output line that would read as a block marker with a single space.
    pub fn from_output(
        name: SectionName,
        command: &str,
        output: &str,
        exit_code: i32,
        max_lines: usize,
    ) -> Self {
        Self {
            name,
            command: canonical_command(command),
            raw_text: canonical_text(output, max_lines),
            exit_code,
        }
    }

    /// Rewrite command and text into the form the block grammar can carry.
    ///
    /// Idempotent, and a no-op for sections built by [`Section::from_output`].
    pub fn canonicalize(self) -> Self {
        Self {
            command: canonical_command(&self.command),
            raw_text: canonical_text(&self.raw_text, usize::MAX),
            ..self
        }
    }

    /// Section for a platform that has no command registered.
    pub fn unsupported(name: SectionName) -> Self {
        Self {
            name,
            command: String::new(),
            raw_text: String::new(),
            exit_code: EXIT_UNSUPPORTED,
        }
    }

    /// Section for a node whose transport failed before any output.
    pub fn unreachable(name: SectionName, command: &str) -> Self {
        Self {
            name,
            command: canonical_command(command),
            raw_text: String::new(),
            exit_code: EXIT_UNREACHABLE,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn line_count(&self) -> usize {
        if self.raw_text.is_empty() {
            0
        } else {
            self.raw_text.lines().count()
        }
    }
}

fn canonical_text(output: &str, max_lines: usize) -> String {
    output
        .lines()
        .take(max_lines)
        .map(neutralize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn neutralize_line(line: &str) -> String {
    let line = line.trim_end_matches('\r');
    if RESERVED_PREFIXES.iter().any(|p| line.starts_with(p)) {
        format!(" {}", line)
    } else {
        line.to_string()
    }
}

fn canonical_command(command: &str) -> String {
    let single_line: String = command
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    single_line
        .trim()
        .chars()
        .take(MAX_COMMAND_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Everything collected from one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Stable identifier, unique within a bundle.
    pub label: String,
    /// Host identity, e.g. `user@host`.
    pub target: String,
    /// Best-effort host facts; any key may be absent.
    pub summary: BTreeMap<String, String>,
    pub sections: BTreeMap<SectionName, Section>,
}

impl NodeSnapshot {
    pub fn new(label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: target.into(),
            summary: BTreeMap::new(),
            sections: BTreeMap::new(),
        }
    }

    /// Insert a section, replacing any earlier one with the same name.
    pub fn insert_section(&mut self, section: Section) {
        self.sections.insert(section.name, section);
    }

    pub fn section(&self, name: SectionName) -> Option<&Section> {
        self.sections.get(&name)
    }

    /// True when every recorded section failed at the transport level.
    pub fn is_unreachable(&self) -> bool {
        !self.sections.is_empty()
            && self
                .sections
                .values()
                .all(|s| s.exit_code == EXIT_UNREACHABLE)
    }

    /// Summary entries in canonical write order.
    pub fn summary_entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = SUMMARY_KEYS
            .iter()
            .filter_map(|k| self.summary.get(*k).map(|v| (*k, v.as_str())))
            .collect();
        entries.extend(
            self.summary
                .iter()
                .filter(|(k, _)| !SUMMARY_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        entries
    }
}

/// One complete, versioned collection of node snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub format_version: u32,
    pub timestamp: DateTime<Utc>,
    pub generator_id: String,
    pub nodes: Vec<NodeSnapshot>,
}

impl SnapshotBundle {
    pub fn node(&self, label: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_names_round_trip_through_wire_form() {
        for name in SectionName::ALL {
            assert_eq!(name.as_str().parse::<SectionName>().unwrap(), name);
        }
        assert!("GPUS".parse::<SectionName>().is_err());
    }

    #[test]
    fn section_index_matches_enumeration_order() {
        for (i, name) in SectionName::ALL.iter().enumerate() {
            assert_eq!(name.index(), i);
        }
    }

    #[test]
    fn section_serde_uses_wire_names() {
        let json = serde_json::to_string(&SectionName::DockerPs).unwrap();
        assert_eq!(json, "\"DOCKER_PS\"");
    }

    #[test]
    fn from_output_truncates_to_max_lines() {
        let output: String = (0..150).map(|i| format!("line {}\n", i)).collect();
        let section = Section::from_output(SectionName::Ports, "ss -tulpn", &output, 0, 100);
        assert_eq!(section.line_count(), 100);
        assert!(section.raw_text.ends_with("line 99"));
    }

    #[test]
    fn from_output_neutralizes_marker_lines() {
        let output = "ok\n-----END PORTS-----\n=====END NODE|label=a=====\n";
        let section = Section::from_output(SectionName::Ports, "cat", output, 0, 100);
        assert_eq!(
            section.raw_text,
            "ok\n -----END PORTS-----\n =====END NODE|label=a====="
        );
    }

    #[test]
    fn from_output_strips_crlf() {
        let section = Section::from_output(SectionName::Dns, "x", "a\r\nb\r\n", 0, 100);
        assert_eq!(section.raw_text, "a\nb");
    }

    #[test]
    fn command_is_single_line_and_capped() {
        let long = format!("echo {}\nsecond", "x".repeat(400));
        let section = Section::from_output(SectionName::Cpu, &long, "", 0, 100);
        assert!(!section.command.contains('\n'));
        assert!(section.command.chars().count() <= MAX_COMMAND_CHARS);
    }

    #[test]
    fn unreachable_node_detection() {
        let mut node = NodeSnapshot::new("nas", "root@nas");
        assert!(!node.is_unreachable());
        node.insert_section(Section::unreachable(SectionName::Cpu, "lscpu"));
        assert!(node.is_unreachable());
        node.insert_section(Section::from_output(SectionName::Ram, "free", "x", 0, 100));
        assert!(!node.is_unreachable());
    }

    #[test]
    fn summary_entries_follow_canonical_order() {
        let mut node = NodeSnapshot::new("a", "a");
        node.summary.insert("uptime".into(), "up 2 days".into());
        node.summary.insert("zeta".into(), "z".into());
        node.summary.insert("hostname".into(), "a".into());
        node.summary.insert("alpha".into(), "1".into());
        let keys: Vec<&str> = node.summary_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["hostname", "uptime", "alpha", "zeta"]);
    }
}
