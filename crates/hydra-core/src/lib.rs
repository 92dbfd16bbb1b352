//! hydra core library
//!
//! Cluster state snapshots and drift detection:
//! - Remote command execution over SSH or a local shell
//! - Snapshot collection into versioned bundles
//! - The snapshot store (locking, atomic writes, retention)
//! - Drift detection and report rendering
//! - Run workflows, exit codes and structured logging for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod collect;
pub mod drift;
pub mod exit_codes;
pub mod logging;
pub mod output;
pub mod remote;
pub mod report;
pub mod store;
pub mod workflow;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use collect::{CollectSummary, SnapshotCollector};
pub use drift::{DriftEngine, DriftOutcome, DriftReport, NodeSectionDiff, DISPLAY_CAP};
pub use exit_codes::ExitCode;
pub use remote::{CommandOutput, ExecError, NodeExecutor, RemoteExecutor};
pub use store::{ArtifactInfo, ArtifactKind, SnapshotStore, StoreError};
pub use workflow::WorkflowError;
