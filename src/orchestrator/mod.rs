//! Run driver
//!
//! Drives one run to a terminal state: ask the scheduler for the next
//! parallel-safe batch, fan the batch out across scoped threads (one
//! executor call per task), join, and either continue or surface the first
//! failure. The run is reloaded from the store between batches so external
//! writers (a `cancel` command, a concurrent status view) are observed.

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::EngineError;
use crate::executor::{Executor, TaskResult};
use crate::fs::Store;
use crate::git::Repo;
use crate::models::{Run, RunStatus, TaskStatus};
use crate::scheduler::Scheduler;
use crate::assistant::Assistant;

/// Progress callback: (completed tasks, total tasks).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

pub struct RunDriver {
    cfg: Config,
    store: Arc<Store>,
    assistant: Arc<dyn Assistant>,
    repo: Arc<dyn Repo>,
}

impl RunDriver {
    pub fn new(
        cfg: Config,
        store: Arc<Store>,
        assistant: Arc<dyn Assistant>,
        repo: Arc<dyn Repo>,
    ) -> Self {
        Self {
            cfg,
            store,
            assistant,
            repo,
        }
    }

    /// Execute a run from its current task state until completion, failure,
    /// or cancellation.
    pub fn execute(
        &self,
        run_id: &str,
        cancel: &CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let mut run = self.store.load_run(run_id)?;
        if run.tasks.is_empty() {
            anyhow::bail!("run {run_id} has no tasks to execute");
        }

        run.status = RunStatus::Running;
        self.store.save_run(&mut run)?;

        self.run_loop(run, cancel, progress)
    }

    /// Resume an interrupted run: demote `running` tasks to `pending`
    /// (clearing their start timestamps) and, when the run previously
    /// failed, reset its failed tasks for retry. Summaries and commit ids of
    /// completed tasks are untouched and stay available to the context
    /// builder.
    pub fn resume(
        &self,
        run_id: &str,
        cancel: &CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let mut run = self.store.load_run(run_id)?;
        match run.status {
            RunStatus::Completed => anyhow::bail!("run {run_id} is already completed"),
            RunStatus::Failed => run.reset_failed_tasks(),
            _ => {}
        }
        run.reset_running_tasks();
        run.status = RunStatus::Running;
        run.error = None;
        self.store.save_run(&mut run)?;

        self.run_loop(run, cancel, progress)
    }

    fn run_loop(
        &self,
        mut run: Run,
        cancel: &CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let total = run.tasks.len();
        let executor = Executor::new(
            &self.cfg,
            &run.worktree_path,
            self.store.clone(),
            run.id.clone(),
            self.assistant.clone(),
            self.repo.clone(),
        );

        report(progress, &run, total);

        loop {
            if cancel.is_cancelled() || run.status == RunStatus::Cancelled {
                return self.finish_cancelled(&run.id);
            }

            let batch = match Scheduler::new(&run, self.cfg.max_parallel).next_batch() {
                Ok(batch) => batch,
                Err(err) => {
                    self.store
                        .set_run_status(&run.id, RunStatus::Failed, Some(err.to_string()))?;
                    return Err(err.into());
                }
            };

            if batch.is_empty() {
                if run.is_complete() {
                    self.store.set_run_status(&run.id, RunStatus::Completed, None)?;
                    return Ok(());
                }
                let stuck: Vec<&str> = run
                    .tasks
                    .iter()
                    .filter(|t| !t.status.is_terminal())
                    .map(|t| t.id.as_str())
                    .collect();
                let reason = format!("unreachable tasks: {}", stuck.join(", "));
                self.store
                    .set_run_status(&run.id, RunStatus::Failed, Some(reason.clone()))?;
                anyhow::bail!("run {} cannot make progress: {reason}", run.id);
            }

            for task_id in &batch {
                self.store
                    .set_task_status(&run.id, task_id, TaskStatus::Ready)?;
            }

            // Snapshot after the ready transitions so prompts see current
            // state.
            let snapshot = self.store.load_run(&run.id)?;
            let results = dispatch_batch(&executor, &snapshot, &batch, cancel);

            if let Some(first_failure) = results.iter().find_map(|r| r.error.clone()) {
                if first_failure == EngineError::Cancelled {
                    return self.finish_cancelled(&run.id);
                }
                self.store.set_run_status(
                    &run.id,
                    RunStatus::Failed,
                    Some(first_failure.to_string()),
                )?;
                return Err(first_failure.into());
            }

            // Other writers may have touched the run (e.g. a cancel
            // request); reload before the next batch.
            run = self.store.load_run(&run.id)?;
            report(progress, &run, total);
        }
    }

    fn finish_cancelled(&self, run_id: &str) -> Result<()> {
        self.store
            .set_run_status(run_id, RunStatus::Cancelled, None)?;
        Err(EngineError::Cancelled.into())
    }
}

/// One scoped thread per batch member; the batch size is already capped by
/// the scheduler.
fn dispatch_batch(
    executor: &Executor,
    snapshot: &Run,
    batch: &[String],
    cancel: &CancelToken,
) -> Vec<TaskResult> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = batch
            .iter()
            .map(|task_id| {
                snapshot
                    .get_task(task_id)
                    .map(|task| scope.spawn(move || executor.execute_task(snapshot, task, cancel)))
            })
            .collect();

        handles
            .into_iter()
            .zip(batch)
            .map(|(handle, task_id)| match handle {
                Some(handle) => handle.join().unwrap_or_else(|_| {
                    failure_result(
                        task_id,
                        EngineError::Assistant {
                            reason: "task execution thread panicked".to_string(),
                        },
                    )
                }),
                // The reload between scheduling and dispatch lost the task;
                // an external writer edited the run under us.
                None => failure_result(
                    task_id,
                    EngineError::TaskNotFound {
                        run_id: snapshot.id.clone(),
                        task_id: task_id.clone(),
                    },
                ),
            })
            .collect()
    })
}

fn failure_result(task_id: &str, error: EngineError) -> TaskResult {
    TaskResult {
        task_id: task_id.to_string(),
        output: String::new(),
        commit: None,
        error: Some(error),
        duration: std::time::Duration::ZERO,
    }
}

fn report(progress: Option<ProgressFn>, run: &Run, total: usize) {
    if let Some(callback) = progress {
        callback(run.completed_ids().len(), total);
    }
}
