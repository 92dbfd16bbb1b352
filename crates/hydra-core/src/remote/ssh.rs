//! SSH transport.
//!
//! Shells out to the system `ssh` client in batch mode. Exit status 255 is
//! the client's own failure code (connection refused, auth failure, DNS) and
//! is classified as a transport failure rather than a command result.

use super::process::run_with_timeout;
use super::{CommandOutput, ExecError, RemoteExecutor};
use hydra_config::{NodeDescriptor, SshSettings};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Exit status the OpenSSH client uses for its own errors.
const SSH_CLIENT_FAILURE: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshExecutor {
    settings: SshSettings,
    max_output: usize,
}

impl SshExecutor {
    pub fn new(settings: SshSettings, max_output: usize) -> Self {
        Self {
            settings,
            max_output,
        }
    }

    /// Total budget for one command: connect plus execution.
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.connect_timeout_secs + self.settings.command_timeout_secs)
    }
}

/// Build the `ssh` argument vector for one command on one node.
pub fn build_ssh_args(node: &NodeDescriptor, settings: &SshSettings, command: &str) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        format!("ConnectTimeout={}", settings.connect_timeout_secs),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ];

    for opt in &settings.options {
        args.push("-o".to_string());
        args.push(opt.clone());
    }

    if let Some(identity) = &settings.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }

    if let Some(port) = node.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    args.push("-T".to_string());
    args.push(node.target());
    args.push(command.to_string());
    args
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, node: &NodeDescriptor, command: &str) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new("ssh");
        cmd.args(build_ssh_args(node, &self.settings, command));
        cmd.env("LC_ALL", "C");

        let raw = run_with_timeout(cmd, self.timeout(), self.max_output)
            .map_err(|e| ExecError::from_spawn("ssh", e))?;
        let mut output = CommandOutput::from_process(raw);
        if output.exit_code == SSH_CLIENT_FAILURE && !output.timed_out {
            output.transport_failure = true;
        }
        debug!(
            node = %node.label,
            exit_code = output.exit_code,
            transport_failure = output.transport_failure,
            duration_ms = output.duration.as_millis() as u64,
            "ssh command finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_config::Platform;
    use std::path::PathBuf;

    #[test]
    fn args_include_batch_options_and_target() {
        let node = NodeDescriptor::new("gpu", "10.0.0.21", Platform::Linux).with_user("ops");
        let args = build_ssh_args(&node, &SshSettings::default(), "uptime -s");
        assert_eq!(&args[..2], &["-o", "ConnectTimeout=15"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert_eq!(args[args.len() - 2], "ops@10.0.0.21");
        assert_eq!(args[args.len() - 1], "uptime -s");
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn args_carry_port_identity_and_extra_options() {
        let node = NodeDescriptor::new("mac", "10.0.0.40", Platform::Macos).with_port(2222);
        let settings = SshSettings {
            identity_file: Some(PathBuf::from("/home/ops/.ssh/id_ed25519")),
            options: vec!["ServerAliveInterval=5".to_string()],
            ..SshSettings::default()
        };
        let args = build_ssh_args(&node, &settings, "true");
        let joined = args.join(" ");
        assert!(joined.contains("-o ServerAliveInterval=5"));
        assert!(joined.contains("-i /home/ops/.ssh/id_ed25519"));
        assert!(joined.contains("-p 2222"));
        assert!(joined.ends_with("10.0.0.40 true"));
    }
}
