//! Snapshot collection.
//!
//! For each node: one summary probe, then every enumerated section in order.
//! Failures are recorded as data. A section that fails keeps its output and
//! exit code; a node whose probe cannot reach it gets every section marked
//! unreachable and no further commands. Nothing here aborts the run for the
//! remaining nodes.

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::remote::RemoteExecutor;
use hydra_bundle::{
    NodeSnapshot, Section, SectionName, EXIT_SPAWN_FAILED, EXIT_UNREACHABLE, EXIT_UNSUPPORTED,
    SUMMARY_MAGIC,
};
use hydra_config::{summary_command, CommandEntry, NodeDescriptor, SectionCommandTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::thread;

/// Collects node snapshots through a [`RemoteExecutor`].
pub struct SnapshotCollector<'a, E: RemoteExecutor + ?Sized> {
    executor: &'a E,
    commands: &'a SectionCommandTable,
    max_lines: usize,
    parallel_nodes: usize,
    ctx: &'a LogContext,
}

impl<'a, E: RemoteExecutor + ?Sized> SnapshotCollector<'a, E> {
    pub fn new(
        executor: &'a E,
        commands: &'a SectionCommandTable,
        max_lines: usize,
        ctx: &'a LogContext,
    ) -> Self {
        Self {
            executor,
            commands,
            max_lines,
            parallel_nodes: 1,
            ctx,
        }
    }

    /// Collect up to `n` nodes at once. Sections within a node stay sequential.
    pub fn with_parallel_nodes(mut self, n: usize) -> Self {
        self.parallel_nodes = n.max(1);
        self
    }

    /// Collect every node, returning snapshots in input order.
    pub fn collect_all(&self, nodes: &[NodeDescriptor]) -> Vec<NodeSnapshot> {
        log_event!(
            self.ctx,
            INFO,
            event_names::COLLECT_STARTED,
            Stage::Collect,
            "collecting snapshots",
            nodes = nodes.len(),
            parallel = self.parallel_nodes
        );

        if self.parallel_nodes <= 1 {
            return nodes.iter().map(|n| self.collect_node(n)).collect();
        }

        nodes
            .chunks(self.parallel_nodes)
            .flat_map(|chunk| {
                thread::scope(|s| {
                    let handles: Vec<_> = chunk
                        .iter()
                        .map(|node| (node, s.spawn(move || self.collect_node(node))))
                        .collect();

                    handles
                        .into_iter()
                        .map(|(node, h)| {
                            h.join().unwrap_or_else(|_| {
                                log_event!(
                                    self.ctx,
                                    ERROR,
                                    event_names::INTERNAL_ERROR,
                                    Stage::Collect,
                                    "collection thread panicked",
                                    node = node.label.as_str()
                                );
                                unreachable_snapshot(node, self.commands)
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect()
    }

    /// Collect one node. Never fails; problems are recorded in the snapshot.
    pub fn collect_node(&self, node: &NodeDescriptor) -> NodeSnapshot {
        log_event!(
            self.ctx,
            DEBUG,
            event_names::COLLECT_NODE_STARTED,
            Stage::Collect,
            "collecting node",
            node = node.label.as_str(),
            target = node.target().as_str(),
            platform = node.platform.as_str()
        );

        let mut snapshot = NodeSnapshot::new(&node.label, node.target());

        let probe = self.executor.execute(node, summary_command(node.platform));
        match probe {
            Ok(out) if out.transport_failure => {
                self.mark_unreachable(node, out.stderr.trim());
                return unreachable_snapshot(node, self.commands);
            }
            Err(e) => {
                self.mark_unreachable(node, &e.to_string());
                return unreachable_snapshot(node, self.commands);
            }
            Ok(out) => snapshot.summary = parse_summary(&out.stdout),
        }

        for name in SectionName::ALL {
            let section = self.collect_section(node, name);
            snapshot.insert_section(section);
        }

        let failed = snapshot
            .sections
            .values()
            .filter(|s| s.exit_code != 0 && s.exit_code != EXIT_UNSUPPORTED)
            .count();
        log_event!(
            self.ctx,
            INFO,
            event_names::COLLECT_NODE_FINISHED,
            Stage::Collect,
            "node collected",
            node = node.label.as_str(),
            sections = snapshot.sections.len(),
            failed = failed
        );
        snapshot
    }

    fn collect_section(&self, node: &NodeDescriptor, name: SectionName) -> Section {
        let command = match self.commands.lookup(name, node.platform) {
            CommandEntry::Command(cmd) => cmd.as_str(),
            CommandEntry::Unsupported => return Section::unsupported(name),
        };

        match self.executor.execute(node, command) {
            Ok(out) => {
                if out.success() {
                    log_event!(
                        self.ctx,
                        DEBUG,
                        event_names::COLLECT_SECTION_DONE,
                        Stage::Collect,
                        "section collected",
                        node = node.label.as_str(),
                        section = name.as_str(),
                        truncated = out.truncated
                    );
                } else {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::COLLECT_SECTION_FAILED,
                        Stage::Collect,
                        "section command failed",
                        node = node.label.as_str(),
                        section = name.as_str(),
                        exit_code = out.exit_code,
                        timed_out = out.timed_out
                    );
                }
                Section::from_output(
                    name,
                    command,
                    out.section_text(),
                    out.exit_code,
                    self.max_lines,
                )
            }
            Err(e) => {
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::COLLECT_SECTION_FAILED,
                    Stage::Collect,
                    "section command could not start",
                    node = node.label.as_str(),
                    section = name.as_str(),
                    error = e.to_string().as_str()
                );
                Section::from_output(
                    name,
                    command,
                    &e.to_string(),
                    EXIT_SPAWN_FAILED,
                    self.max_lines,
                )
            }
        }
    }

    fn mark_unreachable(&self, node: &NodeDescriptor, reason: &str) {
        log_event!(
            self.ctx,
            WARN,
            event_names::COLLECT_NODE_UNREACHABLE,
            Stage::Collect,
            "node unreachable, skipping its sections",
            node = node.label.as_str(),
            target = node.target().as_str(),
            reason = reason
        );
    }
}

/// Snapshot for a node that could not be reached: every section empty with
/// the unreachable exit code.
pub fn unreachable_snapshot(node: &NodeDescriptor, commands: &SectionCommandTable) -> NodeSnapshot {
    let mut snapshot = NodeSnapshot::new(&node.label, node.target());
    for name in SectionName::ALL {
        let command = commands
            .lookup(name, node.platform)
            .command()
            .unwrap_or_default();
        snapshot.insert_section(Section::unreachable(name, command));
    }
    snapshot
}

/// Parse the probe's `HOMEOPS_NODE_SNAPSHOT|key=value|...` line.
///
/// Best effort: malformed pairs and empty values are dropped, and a missing
/// line yields an empty summary.
pub fn parse_summary(output: &str) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::new();
    let Some(line) = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(SUMMARY_MAGIC))
    else {
        return summary;
    };

    for field in line.split('|').skip(1) {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c == '=') {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        summary.insert(key.to_string(), value.to_string());
    }
    summary
}

/// Outcome counts of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectSummary {
    pub nodes_total: usize,
    pub nodes_reachable: usize,
    pub nodes_unreachable: usize,
    pub sections_ok: usize,
    pub sections_failed: usize,
    /// Sections with no command on the node's platform.
    pub sections_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    pub pruned: usize,
}

impl CollectSummary {
    pub fn from_nodes(nodes: &[NodeSnapshot]) -> Self {
        let mut summary = CollectSummary {
            nodes_total: nodes.len(),
            ..CollectSummary::default()
        };
        for node in nodes {
            if node.is_unreachable() {
                summary.nodes_unreachable += 1;
                continue;
            }
            summary.nodes_reachable += 1;
            for section in node.sections.values() {
                match section.exit_code {
                    0 => summary.sections_ok += 1,
                    EXIT_UNSUPPORTED => summary.sections_skipped += 1,
                    _ => summary.sections_failed += 1,
                }
            }
        }
        summary
    }

    /// One-line human summary.
    pub fn one_line(&self) -> String {
        format!(
            "{} node(s): {} reachable, {} unreachable; sections: {} ok, {} failed, {} skipped{}",
            self.nodes_total,
            self.nodes_reachable,
            self.nodes_unreachable,
            self.sections_ok,
            self.sections_failed,
            self.sections_skipped,
            self.artifact_id
                .as_deref()
                .map(|id| format!("; wrote {}", id))
                .unwrap_or_default()
        )
    }
}

/// True when a section failed because its node could not be reached.
pub fn is_unreachable_section(section: &Section) -> bool {
    section.exit_code == EXIT_UNREACHABLE
}
