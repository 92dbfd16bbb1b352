//! Structured event vocabulary.
//!
//! Every event carries the run correlation ids, a stable event name and the
//! pipeline stage it belongs to.

use serde::{Deserialize, Serialize};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, config load, lock acquisition.
    Init,
    /// Remote command execution.
    Collect,
    /// Artifact writes and the latest pointer.
    Store,
    /// Bundle text parsing.
    Parse,
    Diff,
    Report,
    /// Artifact pruning.
    Retention,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Collect => "collect",
            Stage::Store => "store",
            Stage::Parse => "parse",
            Stage::Diff => "diff",
            Stage::Report => "report",
            Stage::Retention => "retention",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config/init
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";
    pub const LOCK_ACQUIRED: &str = "lock.acquired";
    pub const LOCK_STALE_BROKEN: &str = "lock.stale_broken";

    // Collect stage
    pub const COLLECT_STARTED: &str = "collect.started";
    pub const COLLECT_NODE_STARTED: &str = "collect.node_started";
    pub const COLLECT_NODE_UNREACHABLE: &str = "collect.node_unreachable";
    pub const COLLECT_SECTION_DONE: &str = "collect.section_done";
    pub const COLLECT_SECTION_FAILED: &str = "collect.section_failed";
    pub const COLLECT_NODE_FINISHED: &str = "collect.node_finished";
    pub const COLLECT_FINISHED: &str = "collect.finished";

    // Store stage
    pub const STORE_BUNDLE_WRITTEN: &str = "store.bundle_written";
    pub const STORE_LATEST_UPDATED: &str = "store.latest_updated";
    pub const STORE_LATEST_KEPT: &str = "store.latest_kept";
    pub const STORE_REPORT_WRITTEN: &str = "store.report_written";

    // Parse/diff/report
    pub const PARSE_FINISHED: &str = "parse.finished";
    pub const PARSE_FAILED: &str = "parse.failed";
    pub const DIFF_INSUFFICIENT_DATA: &str = "diff.insufficient_data";
    pub const DIFF_FINISHED: &str = "diff.finished";
    pub const REPORT_RENDERED: &str = "report.rendered";

    // Retention
    pub const RETENTION_DELETED: &str = "retention.deleted";
    pub const RETENTION_FINISHED: &str = "retention.finished";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation ids attached to every event of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Context with a fresh run id for this host.
    pub fn for_run() -> Self {
        Self::new(super::generate_run_id(), super::get_host_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [
            Stage::Init,
            Stage::Collect,
            Stage::Store,
            Stage::Parse,
            Stage::Diff,
            Stage::Report,
            Stage::Retention,
        ] {
            assert_eq!(
                serde_json::to_string(&stage).unwrap(),
                format!("\"{}\"", stage)
            );
        }
    }

    #[test]
    fn test_log_context() {
        let ctx = LogContext::new("run-abc", "host-xyz");
        assert_eq!(ctx.run_id, "run-abc");
        assert_eq!(ctx.host_id, "host-xyz");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(event_names::RUN_STARTED, "run.started");
        assert_eq!(event_names::RETENTION_DELETED, "retention.deleted");
    }
}
