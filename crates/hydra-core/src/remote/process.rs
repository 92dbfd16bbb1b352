//! Bounded child-process execution.
//!
//! Runs a prepared `Command` with piped output, a wall-clock deadline and a
//! per-stream byte cap. Output is drained on reader threads so a chatty
//! command can never fill a pipe and stall; on timeout the child is killed.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// How often the child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for pipes to close after the child is gone. A grandchild
/// that inherited the pipe can keep it open indefinitely.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Raw result of one child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit status code; `None` when killed by a signal.
    pub code: Option<i32>,
    /// Signal number when killed by a signal (unix only).
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

#[derive(Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: bool,
}

struct StreamReader {
    capture: Arc<Mutex<Capture>>,
    done: mpsc::Receiver<()>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(mut stream: R, max_bytes: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        let Ok(mut cap) = shared.lock() else { break };
                        let space = max_bytes.saturating_sub(cap.buf.len());
                        if n > space {
                            cap.truncated = true;
                        }
                        let take = n.min(space);
                        cap.buf.extend_from_slice(&chunk[..take]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(());
        });
        Self { capture, done }
    }

    /// Wait for EOF until `deadline`, then take whatever was captured.
    fn finish(self, deadline: Instant) -> (Vec<u8>, bool) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if self.done.recv_timeout(remaining).is_err() {
            trace!("pipe still open after grace period");
        }
        match self.capture.lock() {
            Ok(mut cap) => (std::mem::take(&mut cap.buf), cap.truncated),
            Err(_) => (Vec::new(), true),
        }
    }
}

/// Run `command` to completion or until `timeout` elapses.
///
/// Spawn failures are returned as `Err`; everything after a successful spawn
/// (non-zero exit, timeout, signal) is reported in the output.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    max_output: usize,
) -> io::Result<ProcessOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .map(|s| StreamReader::spawn(s, max_output));
    let stderr = child
        .stderr
        .take()
        .map(|s| StreamReader::spawn(s, max_output));

    let (status, timed_out) = wait_with_deadline(&mut child, start + timeout)?;

    let grace = Instant::now() + PIPE_GRACE;
    let (stdout, out_truncated) = stdout.map(|r| r.finish(grace)).unwrap_or_default();
    let (stderr, err_truncated) = stderr.map(|r| r.finish(grace)).unwrap_or_default();

    let output = ProcessOutput {
        stdout,
        stderr,
        code: status.and_then(|s| s.code()),
        signal: status.and_then(signal_of),
        timed_out,
        truncated: out_truncated || err_truncated,
        duration: start.elapsed(),
    };
    trace!(code = ?output.code, timed_out, "process finished");
    Ok(output)
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> io::Result<(Option<ExitStatus>, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), "command timed out, killing");
            let _ = child.kill();
            return Ok((child.wait().ok(), true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let out = run_with_timeout(sh("echo out; echo err >&2; exit 3"), Duration::from_secs(5), 1024)
            .unwrap();
        assert_eq!(out.stdout, b"out\n");
        assert_eq!(out.stderr, b"err\n");
        assert_eq!(out.code, Some(3));
        assert!(!out.timed_out);
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_with_timeout(sh("sleep 10"), Duration::from_millis(100), 1024).unwrap();
        assert!(out.timed_out);
        assert_eq!(out.code, None);
        assert!(out.duration < Duration::from_secs(5));
    }

    #[test]
    fn caps_output() {
        let out = run_with_timeout(sh("yes | head -c 10000"), Duration::from_secs(5), 100).unwrap();
        assert_eq!(out.stdout.len(), 100);
        assert!(out.truncated);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_with_timeout(
            Command::new("/nonexistent/hydra-test-binary"),
            Duration::from_secs(1),
            64,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
