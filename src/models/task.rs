use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::summary::TaskSummary;

/// One atomic unit of work dispatched to the assistant. The smallest unit of
/// retry and commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Files the task needs to see. Paths are working-copy-relative strings;
    /// no normalization is applied.
    #[serde(default)]
    pub reads: Vec<String>,
    /// Files the task modifies.
    #[serde(default)]
    pub writes: Vec<String>,
    /// Files the task creates.
    #[serde(default)]
    pub creates: Vec<String>,
    /// Ids of tasks in the same run that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Lower runs earlier.
    #[serde(default)]
    pub priority: i32,
    /// Informational grouping tag from the breakdown; the scheduler derives
    /// parallelism from file overlap, not from this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TaskSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Commit id recorded by the executor, absent when the task left the
    /// working copy clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Unknown keys from older or newer versions, preserved on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            creates: Vec::new(),
            depends_on: Vec::new(),
            priority: 0,
            parallel_group: None,
            status: TaskStatus::Pending,
            summary: None,
            error: None,
            started_at: None,
            completed_at: None,
            commit: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Paths the executor must hold exclusively: writes plus creates,
    /// deduplicated, in declaration order.
    pub fn lock_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.writes
            .iter()
            .chain(self.creates.iter())
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }

    /// True when the task is pending and every dependency is in the given
    /// completed set.
    pub fn is_ready(&self, completed: &HashSet<String>) -> bool {
        self.status == TaskStatus::Pending && self.depends_on.iter().all(|d| completed.contains(d))
    }
}
