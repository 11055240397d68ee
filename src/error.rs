//! Engine error kinds
//!
//! Every failure point in the execution engine maps to a distinct kind so the
//! operator layer can decide between rollback, retry, and abort. Errors thread
//! through `anyhow` chains and can be recovered at the driver boundary with
//! `downcast_ref::<EngineError>()`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Could not acquire one of a task's file locks before the deadline.
    #[error("timed out waiting for lock on {path}")]
    LockTimeout { path: String },

    /// File read error other than not-found, or the token budget was
    /// exhausted before the task description fit.
    #[error("failed to build task context: {reason}")]
    ContextBuild { reason: String },

    /// The assistant process exited nonzero, was killed, or produced no output.
    #[error("assistant failed: {reason}")]
    Assistant { reason: String },

    /// Sub-kind of assistant failure surfaced separately so the operator layer
    /// may choose to back off.
    #[error("assistant rate-limited (matched {marker:?})")]
    RateLimited { marker: String },

    /// Staging or committing the task's changes was rejected.
    #[error("commit failed: {reason}")]
    Commit { reason: String },

    /// The store could not write the run file. Fatal for the run.
    #[error("failed to persist run state: {reason}")]
    Persistence { reason: String },

    /// The task dependencies do not admit an execution order.
    #[error("dependency cycle among tasks: {tasks}")]
    DependencyCycle { tasks: String },

    #[error("run {id} not found")]
    NotFound { id: String },

    #[error("task {task_id} not found in run {run_id}")]
    TaskNotFound { run_id: String, task_id: String },

    /// External cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Short stable name of the kind, for task error records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::LockTimeout { .. } => "lock_timeout",
            EngineError::ContextBuild { .. } => "context_build_failure",
            EngineError::Assistant { .. } => "assistant_failure",
            EngineError::RateLimited { .. } => "rate_limited",
            EngineError::Commit { .. } => "commit_failure",
            EngineError::Persistence { .. } => "persistence_failure",
            EngineError::DependencyCycle { .. } => "dependency_cycle",
            EngineError::NotFound { .. } => "not_found",
            EngineError::TaskNotFound { .. } => "task_not_found",
            EngineError::Cancelled => "cancelled",
        }
    }
}
