//! Drift report rendering.
//!
//! The markdown body depends only on the outcome; the single `Generated:`
//! line is the only part that varies between two renders of the same pair.

use crate::drift::{DriftOutcome, DriftReport, NodeSectionDiff};
use chrono::SecondsFormat;
use hydra_bundle::SectionName;

pub const REPORT_TITLE: &str = "# Infrastructure Drift Report";

const RECOMMENDED_ACTIONS: [&str; 4] = [
    "Review each change above and confirm it was intentional.",
    "Record intended changes in the inventory or runbooks.",
    "Investigate and revert changes nobody can account for.",
    "Run `hydra collect` after remediation to establish a new baseline.",
];

/// Render an outcome as a markdown document.
pub fn render_markdown(outcome: &DriftOutcome) -> String {
    let mut lines = vec![
        REPORT_TITLE.to_string(),
        String::new(),
        format!(
            "Generated: {}",
            outcome
                .generated_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
    ];

    match outcome {
        DriftOutcome::InsufficientData { found, .. } => {
            lines.push(String::new());
            lines.push("**Status: Insufficient data**".to_string());
            lines.push(String::new());
            lines.push(format!(
                "Found {} snapshot(s); at least 2 are needed to detect drift.",
                found
            ));
        }
        DriftOutcome::Compared(report) => {
            lines.push(format!(
                "Compared: `{}` -> `{}`",
                report.compared_from, report.compared_to
            ));
            lines.push(format!("Nodes compared: {}", report.nodes_compared));
            lines.push(String::new());
            if report.is_drift_free() {
                render_no_drift(&mut lines);
            } else {
                render_drift(report, &mut lines);
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_no_drift(lines: &mut Vec<String>) {
    lines.push("**Status: No Significant Drift Detected**".to_string());
    lines.push(String::new());
    lines.push("Sections checked:".to_string());
    lines.push(String::new());
    lines.extend(SectionName::ALL.iter().map(|s| format!("- {}", s)));
}

fn render_drift(report: &DriftReport, lines: &mut Vec<String>) {
    lines.push(format!(
        "**Status: Drift Detected** ({} section change(s), {} node change(s))",
        report.changes.len(),
        report.node_changes.len()
    ));

    if !report.node_changes.is_empty() {
        lines.push(String::new());
        lines.push("## Node Changes".to_string());
        lines.push(String::new());
        for change in &report.node_changes {
            lines.push(format!("- `{}`: {}", change.label, change.change));
        }
    }

    for diff in &report.changes {
        lines.push(String::new());
        lines.push(format!("## {} / {}", diff.node_label, diff.section));
        render_block(lines, "Added", &diff.added, diff.added_hidden());
        render_block(lines, "Removed", &diff.removed, diff.removed_hidden());
    }

    lines.push(String::new());
    lines.push("## Recommended Actions".to_string());
    lines.push(String::new());
    for (i, action) in RECOMMENDED_ACTIONS.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, action));
    }
}

fn render_block(lines: &mut Vec<String>, title: &str, shown: &[String], hidden: usize) {
    if shown.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("### {}", title));
    lines.push(String::new());
    let fence = fence_for(shown);
    lines.push(format!("{}text", fence));
    lines.extend(shown.iter().cloned());
    lines.push(fence);
    if hidden > 0 {
        lines.push(format!("...and {} more", hidden));
    }
}

/// Backtick fence longer than any backtick run inside `body`.
fn fence_for(body: &[String]) -> String {
    let longest = body
        .iter()
        .flat_map(|line| line.split(|c| c != '`'))
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Render an outcome as pretty JSON.
pub fn render_json(outcome: &DriftOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(outcome)
}

/// One-line status for cron mail and quick checks.
pub fn render_summary(outcome: &DriftOutcome) -> String {
    match outcome {
        DriftOutcome::InsufficientData { found, .. } => {
            format!("drift: insufficient data ({} snapshot(s) stored)", found)
        }
        DriftOutcome::Compared(report) if report.is_drift_free() => format!(
            "drift: none ({} node(s), {} -> {})",
            report.nodes_compared, report.compared_from, report.compared_to
        ),
        DriftOutcome::Compared(report) => format!(
            "drift: {} section change(s), {} node change(s) across {} node(s): {}",
            report.changes.len(),
            report.node_changes.len(),
            report.nodes_compared,
            touched(&report.changes)
        ),
    }
}

fn touched(changes: &[NodeSectionDiff]) -> String {
    changes
        .iter()
        .map(|c| format!("{}/{}", c.node_label, c.section))
        .collect::<Vec<_>>()
        .join(", ")
}
