//! Local transport: `sh -c` on the machine running hydra.

use super::process::run_with_timeout;
use super::{CommandOutput, ExecError, RemoteExecutor};
use hydra_config::NodeDescriptor;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
    max_output: usize,
}

impl LocalExecutor {
    pub fn new(timeout: Duration, max_output: usize) -> Self {
        Self {
            timeout,
            max_output,
        }
    }
}

impl RemoteExecutor for LocalExecutor {
    fn execute(&self, node: &NodeDescriptor, command: &str) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        // Minimal, predictable environment
        cmd.env_clear();
        for key in ["PATH", "HOME", "USER"] {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.env("LC_ALL", "C");
        cmd.env("LANG", "C");

        let raw = run_with_timeout(cmd, self.timeout, self.max_output)
            .map_err(|e| ExecError::from_spawn("sh", e))?;
        let output = CommandOutput::from_process(raw);
        debug!(
            node = %node.label,
            exit_code = output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            "local command finished"
        );
        Ok(output)
    }
}
