//! Deadline-enforced subprocess execution.
//!
//! One entry point: [`run_subprocess`]. The command string goes through
//! `sh -c` for word splitting, the intent blob is fed on stdin *and*
//! exported as `SKILLSCALE_INTENT`, both output pipes are drained for the
//! whole lifetime of the child, and a wall-clock deadline ends everything
//! with an unconditional kill.
//!
//! Failures never surface as `Err`: spawn errors, nonzero exits, and
//! deadline kills are all encoded in the returned [`ExecutionResult`] so
//! callers have a single reply-construction path.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval for the child-exit/deadline monitor loop.
const WAIT_POLL_MS: u64 = 10;

/// Outcome of one subprocess execution.
///
/// `success` iff the child exited 0. `exit_code == -1` means abnormal
/// termination: killed by the deadline, killed by a signal, or never
/// spawned at all.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Name of the skill that produced this result; filled in by the caller.
    pub matched_skill: String,
}

impl ExecutionResult {
    fn failed(stderr: String, elapsed: Duration) -> Self {
        Self {
            exit_code: -1,
            success: false,
            stdout: String::new(),
            stderr,
            elapsed,
            matched_skill: String::new(),
        }
    }
}

/// Execute `command` under `sh -c` with a wall-clock deadline.
///
/// - `working_dir`: child's working directory, when given.
/// - `stdin_data`: written to the child's stdin from a dedicated thread
///   (blobs larger than the pipe buffer must not stall the read side) and
///   exported as `SKILLSCALE_INTENT`.
/// - `deadline_ms`: on expiry the child gets an unconditional kill signal,
///   is reaped, and the result carries the timeout diagnostic. There is no
///   grace period; children wanting graceful shutdown implement it inside.
/// - `extra_env`: additional environment overlay entries.
///
/// Stdout and stderr are read by background threads while the child runs,
/// so a chatty child never deadlocks on a full pipe, and are joined after
/// exit so trailing buffered bytes are kept.
pub fn run_subprocess(
    command: &str,
    working_dir: Option<&Path>,
    stdin_data: &str,
    deadline_ms: u64,
    extra_env: &[(String, String)],
) -> ExecutionResult {
    let start = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .env("SKILLSCALE_INTENT", stdin_data)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecutionResult::failed(
                format!("Failed to spawn subprocess: {}", err),
                start.elapsed(),
            );
        }
    };

    // Writer thread: a blob bigger than the pipe buffer would block here
    // until the readers below make room, so it cannot share the monitor
    // loop's thread.
    let stdin_handle = child.stdin.take().map(|mut pipe| {
        let blob = stdin_data.as_bytes().to_vec();
        thread::spawn(move || {
            let _ = pipe.write_all(&blob);
            // pipe drops here, closing the child's stdin
        })
    });

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let deadline = Duration::from_millis(deadline_ms);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = stdout_handle
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                let stderr = stderr_handle
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                if let Some(h) = stdin_handle {
                    let _ = h.join();
                }

                let exit_code = status.code().unwrap_or(-1);
                return ExecutionResult {
                    exit_code,
                    success: exit_code == 0,
                    stdout,
                    stderr,
                    elapsed: start.elapsed(),
                    matched_skill: String::new(),
                };
            }
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                drain_handles(stdin_handle, stdout_handle, stderr_handle);
                return ExecutionResult::failed(
                    format!("Failed to wait for subprocess: {}", err),
                    start.elapsed(),
                );
            }
        }

        if start.elapsed() > deadline {
            tracing::warn!(deadline_ms, pid = child.id(), "Deadline expired, killing child");
            let _ = child.kill();
            let _ = child.wait();
            drain_handles(stdin_handle, stdout_handle, stderr_handle);
            return ExecutionResult::failed(
                format!("Execution timed out after {}ms", deadline_ms),
                start.elapsed(),
            );
        }

        thread::sleep(Duration::from_millis(WAIT_POLL_MS));
    }
}

fn drain_handles(
    stdin: Option<thread::JoinHandle<()>>,
    stdout: Option<thread::JoinHandle<String>>,
    stderr: Option<thread::JoinHandle<String>>,
) {
    if let Some(h) = stdin {
        let _ = h.join();
    }
    if let Some(h) = stdout {
        let _ = h.join();
    }
    if let Some(h) = stderr {
        let _ = h.join();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_echo_round_trip() {
        let result = run_subprocess("cat", None, "hello", 5_000, &[]);
        assert_eq!(result.exit_code, 0);
        assert!(result.success);
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "");
    }

    #[test]
    fn test_nonzero_exit_propagates() {
        let result = run_subprocess("echo oops >&2; exit 3", None, "", 5_000, &[]);
        assert_eq!(result.exit_code, 3);
        assert!(!result.success);
        assert_eq!(result.stderr, "oops\n");
    }

    #[test]
    fn test_missing_command_is_127() {
        let result = run_subprocess("definitely-not-a-command-xyz", None, "", 5_000, &[]);
        assert_eq!(result.exit_code, 127);
        assert!(!result.success);
    }

    #[test]
    fn test_deadline_kills_sleeping_child() {
        let start = Instant::now();
        let result = run_subprocess("sleep 30", None, "", 300, &[]);
        assert_eq!(result.exit_code, -1);
        assert!(!result.success);
        assert_eq!(result.stderr, "Execution timed out after 300ms");
        // Well under the child's sleep; the kill was unconditional.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_intent_env_var_is_set() {
        let result = run_subprocess(
            r#"printf '%s' "$SKILLSCALE_INTENT""#,
            None,
            "from-the-env",
            5_000,
            &[],
        );
        assert!(result.success);
        assert_eq!(result.stdout, "from-the-env");
    }

    #[test]
    fn test_extra_env_overlay() {
        let result = run_subprocess(
            r#"printf '%s' "$SKILL_BASE_DIR""#,
            None,
            "",
            5_000,
            &[("SKILL_BASE_DIR".to_string(), "/tmp/skill".to_string())],
        );
        assert_eq!(result.stdout, "/tmp/skill");
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        // ~10.4 MiB of stdout, far beyond the 64 KiB pipe buffer.
        let result = run_subprocess("seq 1 1500000", None, "", 60_000, &[]);
        assert!(result.success);
        assert!(result.stdout.len() > 10_000_000);
        assert!(result.stdout.starts_with("1\n2\n"));
        assert!(result.stdout.ends_with("1500000\n"));
    }

    #[test]
    fn test_large_stdin_blob() {
        // Blob larger than the pipe buffer; cat must see all of it.
        let blob = "x".repeat(1_000_000);
        let result = run_subprocess("cat", None, &blob, 30_000, &[]);
        assert!(result.success);
        assert_eq!(result.stdout.len(), blob.len());
    }

    #[test]
    fn test_working_dir() {
        let tmp = std::env::temp_dir();
        let result = run_subprocess("pwd", Some(&tmp), "", 5_000, &[]);
        assert!(result.success);
        let got = std::path::PathBuf::from(result.stdout.trim());
        assert_eq!(
            got.canonicalize().unwrap(),
            tmp.canonicalize().unwrap()
        );
    }
}
