//! Run persistence
//!
//! Layout under the state directory:
//!
//! ```text
//! <state>/
//!   runs/<id>.json   # one Run, 2-space indent
//!   current.json     # { "run_id": "<id>" } or absent
//! ```
//!
//! Every write is write-then-rename so a crash never leaves a torn run file.
//! Writes are serialized per run id by an in-process mutex table; the design
//! assumes one aiflow process per state directory.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Run, RunStatus, Task, TaskStatus, TaskSummary};

#[derive(Debug, Serialize, Deserialize)]
struct CurrentPointer {
    run_id: String,
}

pub struct Store {
    state_dir: PathBuf,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Store {
    /// Open a store rooted at `state_dir`, creating the layout if missing.
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        let runs_dir = state_dir.join("runs");
        std::fs::create_dir_all(&runs_dir)
            .with_context(|| format!("Failed to create state directory: {}", runs_dir.display()))?;
        Ok(Self {
            state_dir,
            run_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Create a new run in `breakdown` status, persist it, and point
    /// `current.json` at it.
    pub fn create_run(&self, feature_desc: &str, worktree_path: &str, base_branch: &str) -> Result<Run> {
        let id = short_id();
        let mut run = Run::new(id, feature_desc, worktree_path, base_branch);
        self.save_run(&mut run)?;
        self.set_current_run(&run.id)?;
        Ok(run)
    }

    /// Persist a run, bumping `updated_at`.
    pub fn save_run(&self, run: &mut Run) -> Result<()> {
        let guard = self.run_lock(&run.id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());
        self.save_run_locked(run)
    }

    /// Load a run by id. `NotFound` when the file is absent; a present but
    /// unparseable file is rejected.
    pub fn load_run(&self, id: &str) -> Result<Run> {
        let path = self.run_path(id);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NotFound { id: id.to_string() }.into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read run file: {}", path.display())));
            }
        };

        let run: Run = serde_json::from_str(&data).map_err(|e| EngineError::Persistence {
            reason: format!("unparseable run file {}: {e}", path.display()),
        })?;
        Ok(run)
    }

    /// Delete a run file. Clears the current-run pointer when it referenced
    /// the deleted run. Deleting an absent run is not an error.
    pub fn delete_run(&self, id: &str) -> Result<()> {
        let path = self.run_path(id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to delete run file: {}", path.display())));
            }
        }

        if self.get_current_run_id()?.as_deref() == Some(id) {
            self.clear_current_run()?;
        }
        Ok(())
    }

    /// All loadable runs, newest first. Corrupt files are skipped with a
    /// warning rather than failing the listing.
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        let runs_dir = self.state_dir.join("runs");
        let entries = match std::fs::read_dir(&runs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read runs directory: {}", runs_dir.display())));
            }
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load_run(id) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    eprintln!("Warning: skipping run file {}: {e}", path.display());
                }
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    pub fn set_current_run(&self, id: &str) -> Result<()> {
        let pointer = CurrentPointer {
            run_id: id.to_string(),
        };
        let data = serde_json::to_string_pretty(&pointer).map_err(|e| EngineError::Persistence {
            reason: format!("failed to serialize current pointer: {e}"),
        })?;
        write_atomic(&self.current_path(), &data)
    }

    pub fn get_current_run_id(&self) -> Result<Option<String>> {
        let path = self.current_path();
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read current pointer: {}", path.display())));
            }
        };
        let pointer: CurrentPointer = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse current pointer: {}", path.display()))?;
        Ok(Some(pointer.run_id))
    }

    /// The run the current pointer references, if any.
    pub fn current_run(&self) -> Result<Option<Run>> {
        match self.get_current_run_id()? {
            Some(id) => Ok(Some(self.load_run(&id)?)),
            None => Ok(None),
        }
    }

    pub fn clear_current_run(&self) -> Result<()> {
        let path = self.current_path();
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to clear current pointer: {}", path.display())));
            }
        }
        Ok(())
    }

    /// Append a task to a run.
    pub fn add_task(&self, run_id: &str, task: Task) -> Result<()> {
        let guard = self.run_lock(run_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut run = self.load_run(run_id)?;
        run.tasks.push(task);
        self.save_run_locked(&mut run)
    }

    /// Load-mutate-save a single task. `TaskNotFound` when the id is absent.
    pub fn update_task(
        &self,
        run_id: &str,
        task_id: &str,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<()> {
        let guard = self.run_lock(run_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut run = self.load_run(run_id)?;
        let Some(task) = run.get_task_mut(task_id) else {
            return Err(EngineError::TaskNotFound {
                run_id: run_id.to_string(),
                task_id: task_id.to_string(),
            }
            .into());
        };
        mutate(task);
        self.save_run_locked(&mut run)
    }

    /// Set a task's status, stamping `started_at` on `running` and
    /// `completed_at` on terminal states.
    pub fn set_task_status(&self, run_id: &str, task_id: &str, status: TaskStatus) -> Result<()> {
        self.update_task(run_id, task_id, |task| {
            task.status = status;
            let now = Utc::now();
            match status {
                TaskStatus::Running => task.started_at = Some(now),
                TaskStatus::Completed | TaskStatus::Failed => task.completed_at = Some(now),
                TaskStatus::Pending | TaskStatus::Ready => {}
            }
        })
    }

    pub fn set_task_summary(&self, run_id: &str, task_id: &str, summary: TaskSummary) -> Result<()> {
        self.update_task(run_id, task_id, |task| task.summary = Some(summary))
    }

    /// Record a task failure: error message, `failed` status, completion
    /// timestamp.
    pub fn set_task_error(&self, run_id: &str, task_id: &str, error: &str) -> Result<()> {
        self.update_task(run_id, task_id, |task| {
            task.error = Some(error.to_string());
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
        })
    }

    /// Set the run's status and terminal error in one persisted update.
    /// `None` clears any stale error from a previous attempt.
    pub fn set_run_status(&self, run_id: &str, status: RunStatus, error: Option<String>) -> Result<()> {
        let guard = self.run_lock(run_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut run = self.load_run(run_id)?;
        run.status = status;
        run.error = error;
        self.save_run_locked(&mut run)
    }

    fn save_run_locked(&self, run: &mut Run) -> Result<()> {
        run.updated_at = Utc::now();
        let data = serde_json::to_string_pretty(run).map_err(|e| EngineError::Persistence {
            reason: format!("failed to serialize run {}: {e}", run.id),
        })?;
        write_atomic(&self.run_path(&run.id), &data)
    }

    fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut table = self
            .run_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        table.entry(run_id.to_string()).or_default().clone()
    }

    fn run_path(&self, id: &str) -> PathBuf {
        self.state_dir.join("runs").join(format!("{id}.json"))
    }

    fn current_path(&self) -> PathBuf {
        self.state_dir.join("current.json")
    }
}

/// Write-then-rename in the destination directory, the store's only
/// durability primitive.
fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| EngineError::Persistence {
            reason: format!("no parent directory for {}", path.display()),
        })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| EngineError::Persistence {
        reason: format!("failed to create temp file in {}: {e}", dir.display()),
    })?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| EngineError::Persistence {
            reason: format!("failed to write temp file: {e}"),
        })?;
    tmp.persist(path).map_err(|e| EngineError::Persistence {
        reason: format!("failed to replace {}: {e}", path.display()),
    })?;
    Ok(())
}

/// 8-char opaque run id.
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path().join("state")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_create_sets_current_pointer() {
        let (_temp, store) = store();
        let run = store.create_run("add auth", "/tmp/wt", "main").unwrap();

        assert_eq!(run.id.len(), 8);
        assert_eq!(run.status, RunStatus::Breakdown);
        assert_eq!(store.get_current_run_id().unwrap(), Some(run.id.clone()));
        assert_eq!(store.current_run().unwrap().unwrap().id, run.id);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_temp, store) = store();
        let mut run = store.create_run("feature", "/tmp/wt", "main").unwrap();

        let mut task = Task::new("t1", "first task", "do the thing");
        task.writes = vec!["src/lib.rs".into()];
        task.priority = 2;
        run.tasks.push(task);
        store.save_run(&mut run).unwrap();

        let loaded = store.load_run(&run.id).unwrap();
        assert_eq!(loaded.feature_desc, "feature");
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].writes, vec!["src/lib.rs"]);
        assert_eq!(loaded.tasks[0].priority, 2);
        assert_eq!(loaded.created_at, run.created_at);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_temp, store) = store();
        let err = store.load_run("nope1234").unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::NotFound {
                id: "nope1234".to_string()
            })
        );
    }

    #[test]
    fn test_load_rejects_unparseable_file() {
        let (_temp, store) = store();
        let path = store.run_path("broken12");
        std::fs::write(&path, "{ not json").unwrap();

        let err = store.load_run("broken12").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Persistence { .. })
        ));
    }

    #[test]
    fn test_list_skips_corrupt_files() {
        let (_temp, store) = store();
        let a = store.create_run("first", "/tmp/a", "main").unwrap();
        let b = store.create_run("second", "/tmp/b", "main").unwrap();
        std::fs::write(store.run_path("corrupt1"), "garbage").unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        // Newest first.
        assert_eq!(runs[0].id, b.id);
        assert_eq!(runs[1].id, a.id);
    }

    #[test]
    fn test_delete_clears_current_pointer() {
        let (_temp, store) = store();
        let a = store.create_run("first", "/tmp/a", "main").unwrap();
        let b = store.create_run("second", "/tmp/b", "main").unwrap();

        // b is current; deleting a leaves the pointer alone.
        store.delete_run(&a.id).unwrap();
        assert_eq!(store.get_current_run_id().unwrap(), Some(b.id.clone()));

        store.delete_run(&b.id).unwrap();
        assert_eq!(store.get_current_run_id().unwrap(), None);
    }

    #[test]
    fn test_update_task_unknown_id() {
        let (_temp, store) = store();
        let run = store.create_run("feature", "/tmp/wt", "main").unwrap();

        let err = store
            .update_task(&run.id, "missing", |_| unreachable!())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn test_set_task_status_stamps_timestamps() {
        let (_temp, store) = store();
        let mut run = store.create_run("feature", "/tmp/wt", "main").unwrap();
        run.tasks.push(Task::new("t1", "task", ""));
        store.save_run(&mut run).unwrap();

        store
            .set_task_status(&run.id, "t1", TaskStatus::Running)
            .unwrap();
        let loaded = store.load_run(&run.id).unwrap();
        assert!(loaded.tasks[0].started_at.is_some());
        assert!(loaded.tasks[0].completed_at.is_none());

        store
            .set_task_status(&run.id, "t1", TaskStatus::Completed)
            .unwrap();
        let loaded = store.load_run(&run.id).unwrap();
        assert!(loaded.tasks[0].completed_at.is_some());
    }

    #[test]
    fn test_set_task_error_marks_failed() {
        let (_temp, store) = store();
        let mut run = store.create_run("feature", "/tmp/wt", "main").unwrap();
        run.tasks.push(Task::new("t1", "task", ""));
        store.save_run(&mut run).unwrap();

        store
            .set_task_error(&run.id, "t1", "assistant failed: boom")
            .unwrap();
        let loaded = store.load_run(&run.id).unwrap();
        assert_eq!(loaded.tasks[0].status, TaskStatus::Failed);
        assert_eq!(
            loaded.tasks[0].error.as_deref(),
            Some("assistant failed: boom")
        );
    }

    #[test]
    fn test_unknown_run_fields_survive_save() {
        let (_temp, store) = store();
        let run = store.create_run("feature", "/tmp/wt", "main").unwrap();

        // Simulate a newer aiflow having written an extra field.
        let path = store.run_path(&run.id);
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        value["from_the_future"] = serde_json::json!({"keep": "me"});
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

        let mut loaded = store.load_run(&run.id).unwrap();
        store.save_run(&mut loaded).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("from_the_future"));
    }

    #[test]
    fn test_concurrent_task_updates_serialize() {
        let (_temp, store) = store();
        let mut run = store.create_run("feature", "/tmp/wt", "main").unwrap();
        for i in 0..4 {
            run.tasks.push(Task::new(format!("t{i}"), format!("task {i}"), ""));
        }
        store.save_run(&mut run).unwrap();

        let store = std::sync::Arc::new(store);
        std::thread::scope(|s| {
            for i in 0..4 {
                let store = store.clone();
                let run_id = run.id.clone();
                s.spawn(move || {
                    store
                        .set_task_status(&run_id, &format!("t{i}"), TaskStatus::Completed)
                        .unwrap();
                });
            }
        });

        let loaded = store.load_run(&run.id).unwrap();
        assert!(loaded.is_complete());
    }
}
