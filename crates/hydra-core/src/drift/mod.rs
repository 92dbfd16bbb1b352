//! Drift detection between two bundles.
//!
//! Sections are compared as sets of normalized lines: order and duplicate
//! count are ignored, so a line that only moves never reads as drift.
//! Output is fully sorted before capping, which makes two diffs of the same
//! pair identical apart from `generated_at`.

use chrono::{DateTime, Utc};
use hydra_bundle::{NodeSnapshot, SectionName, SnapshotBundle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entries retained per added/removed list.
pub const DISPLAY_CAP: usize = 10;

/// Line-set difference for one section of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSectionDiff {
    pub node_label: String,
    pub section: SectionName,

    /// First lines of the sorted difference, at most the display cap.
    pub added: Vec<String>,
    pub removed: Vec<String>,

    /// Full size of each difference.
    pub added_total: usize,
    pub removed_total: usize,
}

impl NodeSectionDiff {
    pub fn added_hidden(&self) -> usize {
        self.added_total - self.added.len()
    }

    pub fn removed_hidden(&self) -> usize {
        self.removed_total - self.removed.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceChange {
    Added,
    Removed,
}

impl std::fmt::Display for PresenceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceChange::Added => f.write_str("added"),
            PresenceChange::Removed => f.write_str("removed"),
        }
    }
}

/// A node present in only one of the two bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePresenceChange {
    pub label: String,
    pub change: PresenceChange,
}

/// Result of comparing two bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub compared_from: String,
    pub compared_to: String,

    /// Nodes present in both bundles.
    pub nodes_compared: usize,

    /// Sorted by label.
    pub node_changes: Vec<NodePresenceChange>,

    /// Sorted by node label, then section order.
    pub changes: Vec<NodeSectionDiff>,
}

impl DriftReport {
    pub fn is_drift_free(&self) -> bool {
        self.changes.is_empty() && self.node_changes.is_empty()
    }
}

/// Terminal state of a drift run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftOutcome {
    /// Fewer than two bundles in the store.
    InsufficientData {
        found: usize,
        generated_at: DateTime<Utc>,
    },
    Compared(DriftReport),
}

impl DriftOutcome {
    pub fn generated_at(&self) -> DateTime<Utc> {
        match self {
            DriftOutcome::InsufficientData { generated_at, .. } => *generated_at,
            DriftOutcome::Compared(report) => report.generated_at,
        }
    }

    pub fn status_name(&self) -> &'static str {
        match self {
            DriftOutcome::InsufficientData { .. } => "insufficient_data",
            DriftOutcome::Compared(r) if r.is_drift_free() => "no_drift",
            DriftOutcome::Compared(_) => "drift",
        }
    }
}

/// Section-level bundle comparison.
#[derive(Debug, Clone, Copy)]
pub struct DriftEngine {
    cap: usize,
}

impl Default for DriftEngine {
    fn default() -> Self {
        Self { cap: DISPLAY_CAP }
    }
}

impl DriftEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        Self { cap }
    }

    /// Compare `old` against `new`, stamped with the current time.
    ///
    /// `old_id` and `new_id` name the two bundles in the report.
    pub fn diff(
        &self,
        old_id: &str,
        old: &SnapshotBundle,
        new_id: &str,
        new: &SnapshotBundle,
    ) -> DriftReport {
        self.diff_at(old_id, old, new_id, new, Utc::now())
    }

    /// Compare `old` against `new` with an explicit generation time.
    pub fn diff_at(
        &self,
        old_id: &str,
        old: &SnapshotBundle,
        new_id: &str,
        new: &SnapshotBundle,
        generated_at: DateTime<Utc>,
    ) -> DriftReport {
        let old_labels: BTreeSet<&str> = old.labels().collect();
        let new_labels: BTreeSet<&str> = new.labels().collect();

        let mut node_changes: Vec<NodePresenceChange> = new_labels
            .difference(&old_labels)
            .map(|l| (l, PresenceChange::Added))
            .chain(
                old_labels
                    .difference(&new_labels)
                    .map(|l| (l, PresenceChange::Removed)),
            )
            .map(|(label, change)| NodePresenceChange {
                label: label.to_string(),
                change,
            })
            .collect();
        node_changes.sort_by(|a, b| a.label.cmp(&b.label));

        let mut changes = Vec::new();
        let common: Vec<&str> = old_labels.intersection(&new_labels).copied().collect();
        for label in &common {
            if let (Some(old_node), Some(new_node)) = (old.node(label), new.node(label)) {
                changes.extend(self.diff_nodes(old_node, new_node));
            }
        }

        DriftReport {
            generated_at,
            compared_from: old_id.to_string(),
            compared_to: new_id.to_string(),
            nodes_compared: common.len(),
            node_changes,
            changes,
        }
    }

    /// Section diffs for one node, in section order.
    pub fn diff_nodes(&self, old: &NodeSnapshot, new: &NodeSnapshot) -> Vec<NodeSectionDiff> {
        let mut out = Vec::new();
        for name in SectionName::ALL {
            let (Some(before), Some(after)) = (old.section(name), new.section(name)) else {
                continue;
            };
            let before: BTreeSet<&str> = before.normalized_lines().into_iter().collect();
            let after: BTreeSet<&str> = after.normalized_lines().into_iter().collect();

            let added: Vec<&str> = after.difference(&before).copied().collect();
            let removed: Vec<&str> = before.difference(&after).copied().collect();
            if added.is_empty() && removed.is_empty() {
                continue;
            }

            out.push(NodeSectionDiff {
                node_label: new.label.clone(),
                section: name,
                added_total: added.len(),
                removed_total: removed.len(),
                added: self.capped(&added),
                removed: self.capped(&removed),
            });
        }
        out
    }

    // BTreeSet iteration is already sorted.
    fn capped(&self, lines: &[&str]) -> Vec<String> {
        lines.iter().take(self.cap).map(|l| l.to_string()).collect()
    }
}
