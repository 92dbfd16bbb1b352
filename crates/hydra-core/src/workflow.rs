//! Run workflows behind the CLI subcommands.
//!
//! Each workflow takes an already-resolved config and store, so tests can
//! drive them with a [`MockExecutor`](crate::test_utils::MockExecutor) and a
//! temp directory.

use crate::collect::{CollectSummary, SnapshotCollector};
use crate::drift::{DriftEngine, DriftOutcome};
use crate::exit_codes::ExitCode;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::remote::RemoteExecutor;
use crate::report::render_markdown;
use crate::store::{ArtifactInfo, ArtifactKind, PruneReport, SnapshotStore, StoreError};
use chrono::{DateTime, Utc};
use hydra_bundle::{parse_bundle_bytes, BundleBuilder, BundleError, MalformedBundleError};
use hydra_config::{ConfigError, NodeDescriptor, ResolvedConfig, RetentionPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown node label: {label}")]
    UnknownNode { label: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not assemble bundle: {0}")]
    Bundle(#[from] BundleError),

    #[error("stored bundle {id} is malformed: {source}")]
    Malformed {
        id: String,
        #[source]
        source: MalformedBundleError,
    },
}

impl WorkflowError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            WorkflowError::Config(_) => ExitCode::ConfigError,
            WorkflowError::UnknownNode { .. } => ExitCode::ArgsError,
            WorkflowError::Store(StoreError::Locked { .. }) => ExitCode::LockError,
            WorkflowError::Store(StoreError::InvalidId { .. }) => ExitCode::ArgsError,
            WorkflowError::Store(_) => ExitCode::IoError,
            WorkflowError::Bundle(_) => ExitCode::InternalError,
            WorkflowError::Malformed { .. } => ExitCode::BundleError,
        }
    }
}

/// Options for [`run_collect`].
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Restrict collection to these labels; empty means every node.
    pub nodes: Vec<String>,
    /// Apply retention after the bundle is written.
    pub prune: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            prune: true,
        }
    }
}

/// Nodes selected by label, in config order.
pub fn select_nodes<'a>(
    config: &'a ResolvedConfig,
    labels: &[String],
) -> Result<Vec<&'a NodeDescriptor>, WorkflowError> {
    if let Some(unknown) = labels.iter().find(|l| config.config.node(l).is_none()) {
        return Err(WorkflowError::UnknownNode {
            label: unknown.clone(),
        });
    }
    Ok(config
        .config
        .nodes
        .iter()
        .filter(|n| labels.is_empty() || labels.contains(&n.label))
        .collect())
}

/// Collect every selected node, persist the bundle, then apply retention.
///
/// Unreachable nodes and failed sections are data, not errors. Only config,
/// store and assembly failures return `Err`.
pub fn run_collect<E: RemoteExecutor + ?Sized>(
    config: &ResolvedConfig,
    store: &SnapshotStore,
    executor: &E,
    options: &CollectOptions,
    ctx: &LogContext,
) -> Result<CollectSummary, WorkflowError> {
    let nodes: Vec<NodeDescriptor> = select_nodes(config, &options.nodes)?
        .into_iter()
        .cloned()
        .collect();

    let collector = SnapshotCollector::new(
        executor,
        &config.commands,
        config.config.collection.max_lines,
        ctx,
    )
    .with_parallel_nodes(config.config.collection.parallel_nodes);

    let mut builder = BundleBuilder::new(config.config.generator_id.as_str());
    for snapshot in collector.collect_all(&nodes) {
        builder.add_node(snapshot)?;
    }
    let bundle = builder.build()?;

    let mut summary = CollectSummary::from_nodes(&bundle.nodes);
    summary.artifact_id = Some(store.write(&bundle)?);

    if options.prune {
        // The bundle is already durable; a failed prune only delays cleanup.
        match store.prune(&config.config.store.retention, Utc::now()) {
            Ok(report) => summary.pruned = report.deleted_count(),
            Err(e) => log_event!(
                ctx,
                WARN,
                event_names::RETENTION_FINISHED,
                Stage::Retention,
                "retention skipped",
                error = e.to_string().as_str()
            ),
        }
    }
    Ok(summary)
}

/// Result of one drift run.
#[derive(Debug, Clone)]
pub struct DriftRun {
    pub outcome: DriftOutcome,
    pub markdown: String,
    pub report_id: String,
}

/// Compare the two most recent bundles and persist the rendered report.
///
/// Fewer than two bundles is the insufficient-data outcome, not an error.
pub fn run_drift(store: &SnapshotStore, ctx: &LogContext) -> Result<DriftRun, WorkflowError> {
    run_drift_at(store, ctx, Utc::now())
}

pub fn run_drift_at(
    store: &SnapshotStore,
    ctx: &LogContext,
    now: DateTime<Utc>,
) -> Result<DriftRun, WorkflowError> {
    let recent = store.list_recent(2)?;

    let outcome = match recent.as_slice() {
        [newest, previous] => {
            let old = read_bundle(store, previous, ctx)?;
            let new = read_bundle(store, newest, ctx)?;
            let report = DriftEngine::new().diff_at(previous, &old, newest, &new, now);

            log_event!(
                ctx,
                INFO,
                event_names::DIFF_FINISHED,
                Stage::Diff,
                "bundles compared",
                from = previous.as_str(),
                to = newest.as_str(),
                nodes = report.nodes_compared,
                section_changes = report.changes.len(),
                node_changes = report.node_changes.len()
            );
            DriftOutcome::Compared(report)
        }
        _ => {
            log_event!(
                ctx,
                INFO,
                event_names::DIFF_INSUFFICIENT_DATA,
                Stage::Diff,
                "fewer than two bundles stored",
                found = recent.len()
            );
            DriftOutcome::InsufficientData {
                found: recent.len(),
                generated_at: now,
            }
        }
    };

    let markdown = render_markdown(&outcome);
    log_event!(
        ctx,
        DEBUG,
        event_names::REPORT_RENDERED,
        Stage::Report,
        "drift report rendered",
        status = outcome.status_name(),
        bytes = markdown.len()
    );
    let report_id = store.write_report(now, &markdown)?;

    Ok(DriftRun {
        outcome,
        markdown,
        report_id,
    })
}

fn read_bundle(
    store: &SnapshotStore,
    id: &str,
    ctx: &LogContext,
) -> Result<hydra_bundle::SnapshotBundle, WorkflowError> {
    let bytes = store.read_bytes(id)?;
    match parse_bundle_bytes(&bytes) {
        Ok(bundle) => {
            log_event!(
                ctx,
                DEBUG,
                event_names::PARSE_FINISHED,
                Stage::Parse,
                "bundle parsed",
                id = id,
                nodes = bundle.nodes.len()
            );
            Ok(bundle)
        }
        Err(source) => {
            log_event!(
                ctx,
                ERROR,
                event_names::PARSE_FAILED,
                Stage::Parse,
                "stored bundle is malformed",
                id = id,
                error = source.to_string().as_str()
            );
            Err(WorkflowError::Malformed {
                id: id.to_string(),
                source,
            })
        }
    }
}

/// Stored artifacts of one kind, newest first.
pub fn list_artifacts(
    store: &SnapshotStore,
    kind: ArtifactKind,
    limit: Option<usize>,
) -> Result<Vec<ArtifactInfo>, WorkflowError> {
    let mut artifacts = store.list(kind)?;
    if let Some(limit) = limit {
        artifacts.truncate(limit);
    }
    Ok(artifacts)
}

/// Apply or preview retention.
pub fn run_prune(
    store: &SnapshotStore,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> Result<PruneReport, WorkflowError> {
    let now = Utc::now();
    let report = if dry_run {
        store.prune_preview(policy, now)?
    } else {
        store.prune(policy, now)?
    };
    Ok(report)
}
