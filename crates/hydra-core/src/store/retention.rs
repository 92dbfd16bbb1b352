//! Artifact retention.
//!
//! Every pruning action produces a [`RetentionEvent`] and a log line; nothing
//! is deleted silently. The newest [`MIN_RETAINED`] artifacts of each kind
//! and the bundle named by the latest pointer are never candidates.

use super::{ArtifactInfo, ArtifactKind, SnapshotStore, StoreError};
use crate::log_event;
use crate::logging::{event_names, Stage};
use chrono::{DateTime, Utc};
use hydra_config::{RetentionPolicy, MIN_RETAINED};
use serde::{Deserialize, Serialize};
use std::fs;

/// Why an artifact was pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionReason {
    /// Older than the newest `keep_last` artifacts of its kind.
    ExceedsKeepLast { keep_last: usize, position: usize },

    /// Older than `max_age_days`.
    TtlExpired { max_age_days: u32, age_days: i64 },
}

impl std::fmt::Display for RetentionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionReason::ExceedsKeepLast {
                keep_last,
                position,
            } => write!(f, "position {} beyond keep_last={}", position, keep_last),
            RetentionReason::TtlExpired {
                max_age_days,
                age_days,
            } => write!(f, "{} days old, max_age_days={}", age_days, max_age_days),
        }
    }
}

/// One pruning action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionEvent {
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub kind: ArtifactKind,
    pub reason: RetentionReason,

    /// Preview only; nothing was deleted.
    pub dry_run: bool,

    /// False when the delete was attempted and failed.
    pub deleted: bool,

    pub host_id: String,
}

/// Result of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub events: Vec<RetentionEvent>,
    pub kept_bundles: usize,
    pub kept_reports: usize,
    pub dry_run: bool,
}

impl PruneReport {
    pub fn deleted_count(&self) -> usize {
        self.events.iter().filter(|e| e.deleted).count()
    }

    pub fn candidate_count(&self) -> usize {
        self.events.len()
    }
}

/// Select artifacts to prune from a newest-first list.
///
/// Count rule first, then age. `protected` is never selected.
pub fn plan(
    artifacts: &[ArtifactInfo],
    policy: &RetentionPolicy,
    protected: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<(ArtifactInfo, RetentionReason)> {
    let mut selected = Vec::new();
    for (position, artifact) in artifacts.iter().enumerate() {
        if position < MIN_RETAINED || protected == Some(artifact.id.as_str()) {
            continue;
        }

        if let Some(keep_last) = policy.keep_last {
            if position >= keep_last {
                selected.push((
                    artifact.clone(),
                    RetentionReason::ExceedsKeepLast {
                        keep_last,
                        position: position + 1,
                    },
                ));
                continue;
            }
        }

        if let Some(max_age_days) = policy.max_age_days {
            let age_days = (now - artifact.timestamp).num_days();
            if age_days > i64::from(max_age_days) {
                selected.push((
                    artifact.clone(),
                    RetentionReason::TtlExpired {
                        max_age_days,
                        age_days,
                    },
                ));
            }
        }
    }
    selected
}

impl SnapshotStore {
    /// Apply `policy`, deleting selected artifacts.
    pub fn prune(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, StoreError> {
        let _lock = self.lock()?;
        self.apply_retention(policy, now, false)
    }

    /// Report what [`prune`](Self::prune) would delete without touching the store.
    pub fn prune_preview(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, StoreError> {
        self.apply_retention(policy, now, true)
    }

    fn apply_retention(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<PruneReport, StoreError> {
        let bundles = self.list(ArtifactKind::Bundle)?;
        let reports = self.list(ArtifactKind::Report)?;
        let mut report = PruneReport {
            dry_run,
            ..PruneReport::default()
        };

        if policy.is_unbounded() {
            report.kept_bundles = bundles.len();
            report.kept_reports = reports.len();
            return Ok(report);
        }

        // An unreadable pointer only loses its protection; the floor still holds.
        let latest = self.latest().ok().flatten().map(|p| p.id);

        let bundle_plan = plan(&bundles, policy, latest.as_deref(), now);
        let report_plan = plan(&reports, policy, None, now);
        report.kept_bundles = bundles.len() - bundle_plan.len();
        report.kept_reports = reports.len() - report_plan.len();

        for (artifact, reason) in bundle_plan.into_iter().chain(report_plan) {
            let deleted = if dry_run {
                false
            } else {
                self.delete_artifact(&artifact)
            };

            log_event!(
                self.ctx(),
                INFO,
                event_names::RETENTION_DELETED,
                Stage::Retention,
                if dry_run {
                    "would prune artifact"
                } else {
                    "pruned artifact"
                },
                id = artifact.id.as_str(),
                reason = reason.to_string().as_str(),
                dry_run = dry_run,
                deleted = deleted
            );

            report.events.push(RetentionEvent {
                timestamp: now,
                id: artifact.id,
                kind: artifact.kind,
                reason,
                dry_run,
                deleted,
                host_id: self.ctx().host_id.clone(),
            });
        }

        log_event!(
            self.ctx(),
            INFO,
            event_names::RETENTION_FINISHED,
            Stage::Retention,
            "retention pass finished",
            candidates = report.candidate_count(),
            deleted = report.deleted_count(),
            kept_bundles = report.kept_bundles,
            kept_reports = report.kept_reports,
            dry_run = dry_run
        );
        Ok(report)
    }

    fn delete_artifact(&self, artifact: &ArtifactInfo) -> bool {
        let dir = match artifact.kind {
            ArtifactKind::Bundle => self.snapshots_dir(),
            ArtifactKind::Report => self.reports_dir(),
        };
        let path = dir.join(&artifact.id);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete artifact");
                false
            }
        }
    }
}
