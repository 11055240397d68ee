//! Claude Code subprocess client
//!
//! Invokes the assistant binary with `--print --dangerously-skip-permissions`
//! in the task's working copy. The prompt travels over stdin (never through
//! a shell or argv), stdout and stderr are drained on dedicated threads, and
//! the wait loop polls so cancellation and the task deadline both terminate
//! the child deterministically.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::EngineError;

use super::{Assistant, AssistantOutput};

/// How often the wait loop wakes to check cancellation.
const WAIT_POLL: Duration = Duration::from_millis(100);
/// Grace period for drain threads after the child exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ClaudeClient {
    binary: PathBuf,
    model: Option<String>,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            binary: cfg
                .claude_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("claude")),
            model: cfg.model.clone(),
            timeout: cfg.task_timeout(),
        }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--print").arg("--dangerously-skip-permissions");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Assistant for ClaudeClient {
    fn run_prompt(
        &self,
        workdir: &Path,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<AssistantOutput, EngineError> {
        let mut child = self.command(workdir).spawn().map_err(|e| {
            EngineError::Assistant {
                reason: format!(
                    "failed to spawn {} (is it on PATH?): {e}",
                    self.binary.display()
                ),
            }
        })?;

        // Drain both pipes before waiting. If we waited first, the child
        // could block on a full pipe buffer and never exit.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        // Feed the prompt from its own thread too: a crashed child stops
        // reading stdin, and a blocking write here would hang the executor.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            thread::spawn(move || {
                let _ = stdin.write_all(prompt.as_bytes());
                // Dropping stdin closes the pipe and signals end of prompt.
            });
        }

        let status = wait_with_deadline(&mut child, self.timeout, cancel)?;

        let stdout = stdout_rx
            .recv_timeout(DRAIN_TIMEOUT)
            .unwrap_or_default();
        let stderr = stderr_rx
            .recv_timeout(DRAIN_TIMEOUT)
            .unwrap_or_default();

        Ok(AssistantOutput {
            stdout,
            stderr,
            exit_code: status,
        })
    }
}

/// Poll the child until exit, cancellation, or the deadline. Returns the
/// exit code (-1 when the child died to a signal).
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<i32, EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            kill_and_reap(child);
            return Err(EngineError::Cancelled);
        }

        match child.wait_timeout(WAIT_POLL) {
            Ok(Some(status)) => return Ok(status.code().unwrap_or(-1)),
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_and_reap(child);
                    return Err(EngineError::Assistant {
                        reason: format!("assistant exceeded the {}s task timeout", timeout.as_secs()),
                    });
                }
            }
            Err(e) => {
                return Err(EngineError::Assistant {
                    reason: format!("failed waiting for assistant: {e}"),
                });
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read a pipe to completion on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                let _ = tx.send(buf);
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Install an executable script standing in for the claude binary. The
    /// real client always passes its fixed flags, so fakes must ignore argv.
    fn fake_claude(temp: &TempDir, script_body: &str) -> PathBuf {
        let path = temp.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn client_for(binary: PathBuf, timeout: Duration) -> ClaudeClient {
        ClaudeClient {
            binary,
            model: None,
            timeout,
        }
    }

    #[test]
    fn test_missing_binary_is_assistant_failure() {
        let client = client_for(
            PathBuf::from("definitely-not-a-real-binary"),
            Duration::from_secs(5),
        );
        let err = client
            .run_prompt(Path::new("/tmp"), "hello", &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Assistant { .. }));
    }

    #[test]
    fn test_prompt_travels_over_stdin_and_output_is_captured() {
        let temp = TempDir::new().unwrap();
        let binary = fake_claude(&temp, "cat\necho warning >&2");
        let client = client_for(binary, Duration::from_secs(10));

        let out = client
            .run_prompt(temp.path(), "first line\nsecond line", &CancelToken::new())
            .unwrap();

        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("second line"));
        assert!(out.stderr.contains("warning"));
    }

    #[test]
    fn test_nonzero_exit_is_a_normal_return() {
        let temp = TempDir::new().unwrap();
        let binary = fake_claude(&temp, "echo partial output\nexit 3");
        let client = client_for(binary, Duration::from_secs(10));

        let out = client
            .run_prompt(temp.path(), "prompt", &CancelToken::new())
            .unwrap();

        assert_eq!(out.exit_code, 3);
        assert!(out.stdout.contains("partial output"));
    }

    #[test]
    fn test_deadline_kills_the_child() {
        let temp = TempDir::new().unwrap();
        let binary = fake_claude(&temp, "sleep 60");
        let client = client_for(binary, Duration::from_millis(400));

        let started = Instant::now();
        let err = client
            .run_prompt(temp.path(), "prompt", &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, EngineError::Assistant { .. }));
        assert!(err.to_string().contains("timeout"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_interrupts_the_wait() {
        let temp = TempDir::new().unwrap();
        let binary = fake_claude(&temp, "sleep 60");
        let client = client_for(binary, Duration::from_secs(60));

        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let err = client.run_prompt(temp.path(), "prompt", &cancel).unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err, EngineError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_runs_in_the_given_workdir() {
        let temp = TempDir::new().unwrap();
        let binary = fake_claude(&temp, "pwd");
        let workdir = TempDir::new().unwrap();
        let client = client_for(binary, Duration::from_secs(10));

        let out = client
            .run_prompt(workdir.path(), "prompt", &CancelToken::new())
            .unwrap();

        let reported = out.stdout.trim();
        let expected = workdir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(reported).canonicalize().unwrap(),
            expected
        );
    }
}
