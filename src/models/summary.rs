use serde::{Deserialize, Serialize};

/// Structured knowledge extracted after a task completes, consumed by the
/// context builder when prompting later tasks.
///
/// Every field defaults so a partial JSON object from the assistant still
/// decodes; empty fields are simply omitted by the formatters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub functions_added: Vec<String>,
    #[serde(default)]
    pub types_added: Vec<String>,
    #[serde(default)]
    pub patterns_used: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub conventions: Vec<String>,
    #[serde(default)]
    pub gotchas: Vec<String>,
    #[serde(default)]
    pub public_interface: String,
}

impl TaskSummary {
    /// All files the task touched: changed then created.
    pub fn touched_files(&self) -> Vec<String> {
        self.files_changed
            .iter()
            .chain(self.files_created.iter())
            .cloned()
            .collect()
    }
}
