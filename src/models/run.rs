use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::task::{Task, TaskStatus};

/// One feature-implementation attempt: the feature description, the working
/// copy it runs in, and the ordered task list. Task order is load-bearing: it
/// is the tie-break for equal-priority scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub feature_desc: String,
    pub worktree_path: String,
    pub base_branch: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<ProjectType>,
    /// Breakdown conversation transcript. Opaque to the engine; preserved for
    /// the UI layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_conversation: Option<serde_json::Value>,
    /// Unknown keys from older or newer versions, preserved on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Breakdown,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Breakdown => "breakdown",
            RunStatus::Ready => "ready",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Empty,
    Existing,
}

impl Run {
    pub fn new(
        id: impl Into<String>,
        feature_desc: impl Into<String>,
        worktree_path: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            feature_desc: feature_desc.into(),
            worktree_path: worktree_path.into(),
            base_branch: base_branch.into(),
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
            status: RunStatus::Breakdown,
            error: None,
            project_type: None,
            spec_conversation: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Ids of completed tasks.
    pub fn completed_ids(&self) -> HashSet<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn ready_tasks(&self) -> Vec<&Task> {
        let completed = self.completed_ids();
        self.tasks.iter().filter(|t| t.is_ready(&completed)).collect()
    }

    pub fn running_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .collect()
    }

    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    pub fn failed_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }

    /// True when the run has tasks and all of them completed.
    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    /// Completion percentage in [0, 100].
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        completed as f64 / self.tasks.len() as f64 * 100.0
    }

    /// Demote every running task back to pending and clear its start
    /// timestamp. Called on resume: a task left `running` by an interrupted
    /// process never actually finished.
    pub fn reset_running_tasks(&mut self) {
        for task in &mut self.tasks {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                task.started_at = None;
            }
        }
    }

    /// Demote every failed task back to pending, clearing its error and
    /// timestamps. Used when the operator resumes a failed run.
    pub fn reset_failed_tasks(&mut self) {
        for task in &mut self.tasks {
            if task.status == TaskStatus::Failed {
                task.status = TaskStatus::Pending;
                task.error = None;
                task.started_at = None;
                task.completed_at = None;
            }
        }
    }
}
