//! Shared test doubles and fixtures
//!
//! The executor and run driver talk to the assistant and the repository
//! through capability traits; these scripted implementations let the
//! lifecycle tests run without subprocesses or real git state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::assistant::{Assistant, AssistantOutput};
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::git::Repo;
use crate::models::{Run, Task};

/// Assistant driven by a closure over the prompt text.
pub struct ScriptedAssistant<F> {
    respond: F,
}

impl<F> ScriptedAssistant<F>
where
    F: Fn(&str) -> Result<AssistantOutput, EngineError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

impl<F> Assistant for ScriptedAssistant<F>
where
    F: Fn(&str) -> Result<AssistantOutput, EngineError> + Send + Sync,
{
    fn run_prompt(
        &self,
        _workdir: &Path,
        prompt: &str,
        _cancel: &CancelToken,
    ) -> Result<AssistantOutput, EngineError> {
        (self.respond)(prompt)
    }
}

pub fn ok_output(stdout: &str) -> AssistantOutput {
    AssistantOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

pub fn exit_output(code: i32, stdout: &str, stderr: &str) -> AssistantOutput {
    AssistantOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code: code,
    }
}

/// A well-formed summary response wrapped in the prose the parser tolerates.
pub fn summary_response(files: &[&str]) -> String {
    let json = serde_json::json!({
        "files_changed": files,
        "files_created": [],
        "functions_added": ["fn example()"],
        "types_added": [],
        "patterns_used": [],
        "decisions": ["kept it simple"],
        "conventions": [],
        "gotchas": [],
        "public_interface": "example()"
    });
    format!("Here is the summary:\n{json}")
}

/// Repository double with scripted dirty state: `always_dirty` models an
/// assistant that edits files before every commit, `always_clean` one that
/// changes nothing. Commit messages are recorded for assertions.
pub struct ScriptedRepo {
    dirty: AtomicBool,
    dirty_after_commit: AtomicBool,
    fail_commit: AtomicBool,
    counter: AtomicUsize,
    last_sha: Mutex<String>,
    pub commits: Mutex<Vec<String>>,
}

impl Default for ScriptedRepo {
    fn default() -> Self {
        Self {
            dirty: AtomicBool::new(false),
            dirty_after_commit: AtomicBool::new(true),
            fail_commit: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
            last_sha: Mutex::new(format!("{:040x}", 0xbadeu64)),
            commits: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRepo {
    /// A repo that reports dirty before every commit, so each task commits.
    pub fn always_dirty() -> Self {
        let repo = Self::default();
        repo.dirty.store(true, Ordering::SeqCst);
        repo
    }

    /// A repo that stays clean; tasks complete without a commit.
    pub fn always_clean() -> Self {
        let repo = Self::default();
        repo.dirty_after_commit.store(false, Ordering::SeqCst);
        repo
    }

    pub fn failing_commits() -> Self {
        let repo = Self::always_dirty();
        repo.fail_commit.store(true, Ordering::SeqCst);
        repo
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }
}

impl Repo for ScriptedRepo {
    fn is_dirty(&self) -> anyhow::Result<bool> {
        Ok(self.dirty.load(Ordering::SeqCst))
    }

    fn stage_all(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn commit(&self, message: &str) -> anyhow::Result<String> {
        if self.fail_commit.load(Ordering::SeqCst) {
            anyhow::bail!("pre-commit hook rejected the commit");
        }
        self.commits.lock().unwrap().push(message.to_string());
        // Stay dirty for the next task unless configured clean.
        self.dirty
            .store(self.dirty_after_commit.load(Ordering::SeqCst), Ordering::SeqCst);
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let sha = format!("{:040x}", n + 0xabc);
        *self.last_sha.lock().unwrap() = sha.clone();
        Ok(sha)
    }

    fn reset_hard(&self, _target: &str) -> anyhow::Result<()> {
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn head(&self) -> anyhow::Result<String> {
        Ok(self.last_sha.lock().unwrap().clone())
    }
}

/// A task writing the given files, pending, default priority.
pub fn writer_task(id: &str, writes: &[&str]) -> Task {
    let mut t = Task::new(id, format!("task {id}"), format!("implement {id}"));
    t.writes = writes.iter().map(|s| s.to_string()).collect();
    t
}

/// A run holding the given tasks, in `ready` status.
pub fn ready_run(id: &str, worktree: &Path, tasks: Vec<Task>) -> Run {
    let mut run = Run::new(id, "test feature", worktree.to_string_lossy(), "main");
    run.status = crate::models::RunStatus::Ready;
    run.tasks = tasks;
    run
}
