//! Per-task execution lifecycle
//!
//! One task runs as: acquire file locks, mark running, build the prompt,
//! drive the assistant, extract a summary (best effort), commit, mark
//! completed. Every status edge is persisted write-through so an interrupted
//! process resumes from durable state, and the lock set is released on every
//! exit path.


use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::assistant::{detect_rate_limit, Assistant};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::context::{parse_summary, ContextBuilder, SUMMARY_EXTRACTION_PROMPT};
use crate::error::EngineError;
use crate::fs::{LockManager, Store};
use crate::git::Repo;
use crate::models::{Run, Task, TaskStatus, TaskSummary};

pub struct Executor {
    cfg: Config,
    workdir: PathBuf,
    store: Arc<Store>,
    run_id: String,
    locks: LockManager,
    assistant: Arc<dyn Assistant>,
    repo: Arc<dyn Repo>,
}

/// Outcome of one task execution, returned to the run driver.
#[derive(Debug)]
pub struct TaskResult {
    pub task_id: String,
    /// Assistant stdout from the main invocation (may be partial on failure).
    pub output: String,
    pub commit: Option<String>,
    pub error: Option<EngineError>,
    pub duration: Duration,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

impl Executor {
    pub fn new(
        cfg: &Config,
        workdir: impl Into<PathBuf>,
        store: Arc<Store>,
        run_id: impl Into<String>,
        assistant: Arc<dyn Assistant>,
        repo: Arc<dyn Repo>,
    ) -> Self {
        let workdir = workdir.into();
        Self {
            locks: LockManager::new(&workdir, cfg.lock_timeout()),
            cfg: cfg.clone(),
            workdir,
            store,
            run_id: run_id.into(),
            assistant,
            repo,
        }
    }

    /// Run one task to a terminal state. `run` is the snapshot the prompt is
    /// built from; task status, summary, and commit id are persisted through
    /// the store as they happen.
    pub fn execute_task(&self, run: &Run, task: &Task, cancel: &CancelToken) -> TaskResult {
        let started = Instant::now();

        // Locks are redundant with batch scheduling for the happy path; they
        // defend against graph bugs and concurrent aiflow invocations.
        let _locks = match self.locks.acquire(&task.lock_paths()) {
            Ok(locks) => locks,
            Err(err) => return self.fail_task(task, err, started, String::new()),
        };

        if let Err(e) = self
            .store
            .set_task_status(&self.run_id, &task.id, TaskStatus::Running)
        {
            return self.fail_task(task, persistence(e), started, String::new());
        }

        let builder = ContextBuilder::new(&self.workdir, &self.cfg, run);
        let prompt = match builder.build_task_prompt(task) {
            Ok(prompt) => prompt,
            Err(err) => return self.fail_task(task, err, started, String::new()),
        };

        let output = match self.assistant.run_prompt(&self.workdir, &prompt, cancel) {
            Ok(output) => output,
            Err(err) => return self.fail_task(task, err, started, String::new()),
        };

        if let Some(marker) = detect_rate_limit(&output.combined()) {
            let err = EngineError::RateLimited {
                marker: marker.to_string(),
            };
            return self.fail_task(task, err, started, output.stdout);
        }
        if !output.success() {
            let err = EngineError::Assistant {
                reason: format!(
                    "exited with code {}: {}",
                    output.exit_code,
                    clip(output.stderr.trim(), 300)
                ),
            };
            return self.fail_task(task, err, started, output.stdout);
        }
        if output.stdout.trim().is_empty() {
            let err = EngineError::Assistant {
                reason: "produced no output".to_string(),
            };
            return self.fail_task(task, err, started, output.stdout);
        }

        // Second invocation: summary extraction. Runs in the same working
        // copy before the commit, so it sees the changes it is describing.
        // Everything but cancellation is downgraded to a warning here.
        match self.extract_summary(task, cancel) {
            Ok(Some(summary)) => {
                if let Err(e) = self.store.set_task_summary(&self.run_id, &task.id, summary) {
                    return self.fail_task(task, persistence(e), started, output.stdout);
                }
            }
            Ok(None) => {
                eprintln!(
                    "Warning: no parseable summary for task {}; continuing without one",
                    task.id
                );
            }
            Err(EngineError::Cancelled) => {
                return self.fail_task(task, EngineError::Cancelled, started, output.stdout);
            }
            Err(err) => {
                eprintln!("Warning: summary extraction for task {} failed: {err}", task.id);
            }
        }

        let commit = match self.commit_task(task) {
            Ok(commit) => commit,
            Err(err) => return self.fail_task(task, err, started, output.stdout),
        };
        if let Some(sha) = &commit {
            let sha = sha.clone();
            if let Err(e) = self
                .store
                .update_task(&self.run_id, &task.id, move |t| t.commit = Some(sha))
            {
                return self.fail_task(task, persistence(e), started, output.stdout);
            }
        }

        if let Err(e) = self
            .store
            .set_task_status(&self.run_id, &task.id, TaskStatus::Completed)
        {
            return self.fail_task(task, persistence(e), started, output.stdout);
        }

        TaskResult {
            task_id: task.id.clone(),
            output: output.stdout,
            commit,
            error: None,
            duration: started.elapsed(),
        }
    }

    fn extract_summary(
        &self,
        task: &Task,
        cancel: &CancelToken,
    ) -> Result<Option<TaskSummary>, EngineError> {
        let output = self
            .assistant
            .run_prompt(&self.workdir, SUMMARY_EXTRACTION_PROMPT, cancel)?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_summary(&task.id, &output.stdout))
    }

    /// Commit the task's changes when the tree is dirty; a clean tree means
    /// no commit and no commit id.
    fn commit_task(&self, task: &Task) -> Result<Option<String>, EngineError> {
        let dirty = self.repo.is_dirty().map_err(commit_error)?;
        if !dirty {
            return Ok(None);
        }
        self.repo.stage_all().map_err(commit_error)?;
        let sha = self
            .repo
            .commit(&format!("aiflow: {}", task.title))
            .map_err(commit_error)?;
        Ok(Some(sha))
    }

    /// Persist the failed status (locks are still held at this point) and
    /// build the failure result. The lock set drops when the caller returns.
    fn fail_task(
        &self,
        task: &Task,
        error: EngineError,
        started: Instant,
        output: String,
    ) -> TaskResult {
        if let Err(e) = self
            .store
            .set_task_error(&self.run_id, &task.id, &error.to_string())
        {
            eprintln!(
                "Warning: failed to persist failure of task {}: {e}",
                task.id
            );
        }
        TaskResult {
            task_id: task.id.clone(),
            output,
            commit: None,
            error: Some(error),
            duration: started.elapsed(),
        }
    }
}

fn commit_error(e: anyhow::Error) -> EngineError {
    EngineError::Commit {
        reason: e.to_string(),
    }
}

/// Unwrap a typed engine error out of an anyhow chain, defaulting to a
/// persistence failure.
fn persistence(e: anyhow::Error) -> EngineError {
    match e.downcast::<EngineError>() {
        Ok(err) => err,
        Err(e) => EngineError::Persistence {
            reason: e.to_string(),
        },
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars).collect();
        format!("{kept}...")
    }
}
