//! Bounded external-command execution.
//!
//! Live quota tools on a busy cluster can hang on a quorum loss or a slow
//! manager node. Every live invocation therefore gets a wall-clock
//! deadline; on expiry the child is killed and whatever stdout it already
//! produced is returned as the result. Truncated output is not an error
//! here: callers validate it against the backend's signature token and
//! fall back to the snapshot path when it is unusable.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Deadline applied to every live quota query.
pub const COMMAND_DEADLINE: Duration = Duration::from_secs(4);

/// How often the child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command and capture stdout, enforcing a wall-clock deadline.
///
/// On deadline expiry the child is killed and the partial stdout collected
/// so far is returned; a timeout is never an error. Spawn failures (tool
/// not installed, permission denied) are errors.
pub fn run_deadline(cmd: &str, args: &[&str], deadline: Duration) -> Result<String> {
    let mut command = Command::new(cmd);
    command.args(args);
    run_deadline_cmd(command, deadline)
}

/// [`run_deadline`] over a caller-prepared [`Command`], for invocations
/// that need environment variables or other setup.
pub fn run_deadline_cmd(mut command: Command, deadline: Duration) -> Result<String> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;

    // Forward stdout chunks over a channel instead of joining the reader:
    // a descendant that inherits the write end keeps the pipe open past
    // the child's own death, and a blocking drain would stall on it
    // arbitrarily. The reader thread is left parked in that case and dies
    // with the process.
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || {
        let mut stdout = stdout;
        let mut buf = [0_u8; 4096];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let start = Instant::now();
    let mut bytes = Vec::new();
    loop {
        while let Ok(chunk) = rx.try_recv() {
            bytes.extend_from_slice(&chunk);
        }
        if child.try_wait()?.is_some() {
            break;
        }
        if start.elapsed() >= deadline {
            log::debug!("{command:?} exceeded {deadline:?} deadline, killing");
            let _ = child.kill();
            let _ = child.wait();
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Collect what arrived before the child ended, for at most one more
    // poll interval, so an open pipe held by a survivor cannot stall the
    // return.
    let drain_start = Instant::now();
    while let Some(remaining) = POLL_INTERVAL.checked_sub(drain_start.elapsed()) {
        match rx.recv_timeout(remaining) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(_) => break,
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Run a command to completion and capture stdout, no deadline.
///
/// Used in debug mode, where seeing the tool fail loudly beats a silent
/// partial read. Non-zero exit is an error carrying stderr.
pub fn run_captured(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd).args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(crate::Error::live_failed(format!(
            "{cmd} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_command_completes() {
        let out = run_deadline("echo", &["hello"], COMMAND_DEADLINE).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_deadline_returns_partial_output() {
        let out = run_deadline(
            "sh",
            &["-c", "echo first; sleep 5; echo second"],
            Duration::from_millis(300),
        )
        .unwrap();
        assert_eq!(out, "first\n");
    }

    #[test]
    fn test_surviving_descendant_does_not_stall_return() {
        // The shell exits at once but the backgrounded sleep inherits the
        // stdout write end; the call must still return by the deadline.
        let start = Instant::now();
        let out = run_deadline(
            "sh",
            &["-c", "sleep 8 & echo hi"],
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(out, "hi\n");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_prepared_command_carries_environment() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf '%s' \"$QUOTA_TEST_MARKER\""]);
        command.env("QUOTA_TEST_MARKER", "present");

        let out = run_deadline_cmd(command, COMMAND_DEADLINE).unwrap();
        assert_eq!(out, "present");
    }

    #[test]
    fn test_missing_tool_is_an_error() {
        assert!(run_deadline("/no/such/quota-tool", &[], COMMAND_DEADLINE).is_err());
    }

    #[test]
    fn test_run_captured_reports_failure() {
        let err = run_captured("sh", &["-c", "echo oops >&2; exit 3"]).unwrap_err();
        assert!(err.to_string().contains("oops"));
    }
}
