//! Bundle text serialization.
//!
//! ```text
//! HYDRA_SNAPSHOT_BUNDLE|version=1|timestamp=2026-10-15T03:00:00Z|generator=hydra
//! =====BEGIN NODE|label=gpu|target=ops@10.0.0.5=====
//! HOMEOPS_NODE_SNAPSHOT|hostname=gpu|os=Ubuntu|...
//! -----BEGIN PORTS-----
//! CMD: ss -tulpn
//! ...
//! EXIT: 0
//! -----END PORTS-----
//! =====END NODE|label=gpu=====
//! ```

use crate::model::{NodeSnapshot, Section, SnapshotBundle};
use chrono::SecondsFormat;
use std::fmt::Write as _;
use std::io;

pub(crate) const BUNDLE_MAGIC: &str = "HYDRA_SNAPSHOT_BUNDLE";
/// Starts the per-node summary line, both in bundles and in summary command output.
pub const SUMMARY_MAGIC: &str = "HOMEOPS_NODE_SNAPSHOT";
pub(crate) const NODE_BEGIN: &str = "=====BEGIN NODE";
pub(crate) const NODE_END: &str = "=====END NODE";
pub(crate) const NODE_FENCE: &str = "=====";
pub(crate) const SECTION_BEGIN: &str = "-----BEGIN ";
pub(crate) const SECTION_END: &str = "-----END ";
pub(crate) const SECTION_FENCE: &str = "-----";
pub(crate) const CMD_PREFIX: &str = "CMD:";
pub(crate) const EXIT_PREFIX: &str = "EXIT:";

/// Serialize a bundle into its text form.
pub fn serialize(bundle: &SnapshotBundle) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}|version={}|timestamp={}|generator={}",
        BUNDLE_MAGIC,
        bundle.format_version,
        bundle.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        bundle.generator_id
    );
    for node in &bundle.nodes {
        write_node(&mut out, node);
    }
    out
}

/// Serialize a bundle into any writer.
pub fn write_to<W: io::Write>(bundle: &SnapshotBundle, mut writer: W) -> io::Result<()> {
    writer.write_all(serialize(bundle).as_bytes())?;
    writer.flush()
}

fn write_node(out: &mut String, node: &NodeSnapshot) {
    let _ = writeln!(
        out,
        "{}|label={}|target={}{}",
        NODE_BEGIN, node.label, node.target, NODE_FENCE
    );

    out.push_str(SUMMARY_MAGIC);
    for (key, value) in node.summary_entries() {
        let _ = write!(out, "|{}={}", key, value);
    }
    out.push('\n');

    for section in node.sections.values() {
        write_section(out, section);
    }

    let _ = writeln!(out, "{}|label={}{}", NODE_END, node.label, NODE_FENCE);
}

fn write_section(out: &mut String, section: &Section) {
    let name = section.name.as_str();
    let _ = writeln!(out, "{}{}{}", SECTION_BEGIN, name, SECTION_FENCE);
    let _ = writeln!(out, "{} {}", CMD_PREFIX, section.command);
    if !section.raw_text.is_empty() {
        out.push_str(&section.raw_text);
        out.push('\n');
    }
    let _ = writeln!(out, "{} {}", EXIT_PREFIX, section.exit_code);
    let _ = writeln!(out, "{}{}{}", SECTION_END, name, SECTION_FENCE);
}
