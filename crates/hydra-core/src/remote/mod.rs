//! Remote command execution.
//!
//! The collector talks to nodes only through [`RemoteExecutor`]. Two
//! transports exist: `ssh` for remote nodes and `sh -c` for the machine
//! running hydra. [`NodeExecutor`] picks one per node.

pub mod local;
pub mod process;
pub mod ssh;

pub use local::LocalExecutor;
pub use ssh::SshExecutor;

use hydra_bundle::{EXIT_TIMED_OUT, EXIT_UNREACHABLE};
use hydra_config::{CollectionSettings, NodeDescriptor, SshSettings, Transport};
use process::ProcessOutput;
use std::time::Duration;
use thiserror::Error;

/// Exit code reported by an unknown termination (no code, no signal).
const EXIT_ABNORMAL: i32 = 1;

/// Errors that prevent a command from running at all.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} not found on PATH")]
    ProgramNotFound { program: String },
}

impl ExecError {
    pub(crate) fn from_spawn(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExecError::ProgramNotFound {
                program: program.to_string(),
            }
        } else {
            ExecError::SpawnFailed {
                program: program.to_string(),
                source,
            }
        }
    }
}

/// Output of one command on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
    /// The node itself could not be reached; the command never ran.
    pub transport_failure: bool,
    pub duration: Duration,
}

impl CommandOutput {
    /// A command that ran and exited normally.
    pub fn completed(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            truncated: false,
            transport_failure: false,
            duration: Duration::ZERO,
        }
    }

    /// A connection failure before the command could run.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: EXIT_UNREACHABLE,
            timed_out: false,
            truncated: false,
            transport_failure: true,
            duration: Duration::ZERO,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.transport_failure
    }

    /// Text to record for a section: stdout, or stderr when stdout is empty.
    pub fn section_text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }

    pub(crate) fn from_process(out: ProcessOutput) -> Self {
        let exit_code = if out.timed_out {
            EXIT_TIMED_OUT
        } else {
            match (out.code, out.signal) {
                (Some(code), _) => code,
                (None, Some(signal)) => 128 + signal,
                (None, None) => EXIT_ABNORMAL,
            }
        };
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code,
            timed_out: out.timed_out,
            truncated: out.truncated,
            transport_failure: false,
            duration: out.duration,
        }
    }
}

/// Runs shell commands on a node.
pub trait RemoteExecutor: Send + Sync {
    fn execute(&self, node: &NodeDescriptor, command: &str) -> Result<CommandOutput, ExecError>;
}

/// Dispatches to the transport configured on each node.
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    ssh: SshExecutor,
    local: LocalExecutor,
}

impl NodeExecutor {
    pub fn new(ssh: &SshSettings, collection: &CollectionSettings) -> Self {
        let timeout = Duration::from_secs(ssh.command_timeout_secs);
        Self {
            ssh: SshExecutor::new(ssh.clone(), collection.max_output_bytes),
            local: LocalExecutor::new(timeout, collection.max_output_bytes),
        }
    }
}

impl RemoteExecutor for NodeExecutor {
    fn execute(&self, node: &NodeDescriptor, command: &str) -> Result<CommandOutput, ExecError> {
        match node.transport {
            Transport::Ssh => self.ssh.execute(node, command),
            Transport::Local => self.local.execute(node, command),
        }
    }
}
