//! Dependency-aware batch scheduler
//!
//! Builds a DAG from explicit `depends_on` edges plus implicit edges derived
//! from file overlap, then emits parallel-safe batches: every batch respects
//! the concurrency cap and contains no two overlapping tasks. Batching is
//! deterministic for a fixed task list.

mod graph;
pub mod overlap;


pub use graph::DependencyGraph;
pub use overlap::files_overlap;

use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::models::{Run, Task, TaskStatus};

pub struct Scheduler<'a> {
    run: &'a Run,
    max_parallel: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(run: &'a Run, max_parallel: usize) -> Self {
        Self {
            run,
            max_parallel: max_parallel.max(1),
        }
    }

    /// All remaining batches, in execution order. Completed tasks are
    /// treated as already satisfied; failed tasks are never rescheduled and
    /// their dependents stay unscheduled (the driver reports them as
    /// unreachable when the batch list runs dry).
    pub fn generate_batches(&self) -> Result<Vec<Vec<String>>, EngineError> {
        let graph = DependencyGraph::build(self.run)?;

        let completed = self.run.completed_ids();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for task in &self.run.tasks {
            if completed.contains(&task.id) {
                continue;
            }
            let satisfied = graph
                .dependencies_of(&task.id)
                .iter()
                .filter(|d| completed.contains(*d))
                .count();
            in_degree.insert(&task.id, graph.in_degree(&task.id) - satisfied);
        }

        let mut accounted: HashSet<&str> = self
            .run
            .tasks
            .iter()
            .filter(|t| completed.contains(&t.id))
            .map(|t| t.id.as_str())
            .collect();
        let mut batches = Vec::new();

        loop {
            // Candidates in task-list order, so the later priority sort's
            // tie-break is insertion order.
            let candidates: Vec<&Task> = self
                .run
                .tasks
                .iter()
                .filter(|t| {
                    !accounted.contains(t.id.as_str())
                        && t.status != TaskStatus::Failed
                        && in_degree.get(t.id.as_str()).copied() == Some(0)
                })
                .collect();

            if candidates.is_empty() {
                let remaining: Vec<&str> = self
                    .run
                    .tasks
                    .iter()
                    .filter(|t| {
                        !accounted.contains(t.id.as_str()) && t.status != TaskStatus::Failed
                    })
                    .map(|t| t.id.as_str())
                    .collect();
                if remaining.is_empty() || blocked_by_failure(self.run, &graph, &remaining) {
                    break;
                }
                return Err(EngineError::DependencyCycle {
                    tasks: remaining.join(", "),
                });
            }

            let admitted = select_batch(&candidates, self.max_parallel);
            for id in &admitted {
                if let Some(owned) = self.run.get_task(id) {
                    accounted.insert(owned.id.as_str());
                }
                for dependent in graph.dependents_of(id) {
                    if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }

            batches.push(admitted);
        }

        Ok(batches)
    }

    /// The next batch ready for dispatch, empty when nothing is schedulable.
    pub fn next_batch(&self) -> Result<Vec<String>, EngineError> {
        let mut batches = self.generate_batches()?;
        if batches.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(batches.remove(0))
        }
    }
}

/// Sort candidates by priority (stable, so insertion order breaks ties),
/// truncate to the concurrency cap, then greedily drop any task overlapping
/// an already-admitted one. Dropped tasks stay available for later batches.
fn select_batch(candidates: &[&Task], max_parallel: usize) -> Vec<String> {
    let mut ordered: Vec<&Task> = candidates.to_vec();
    ordered.sort_by_key(|t| t.priority);
    ordered.truncate(max_parallel);

    let mut admitted: Vec<&Task> = Vec::new();
    for candidate in ordered {
        if admitted.iter().any(|t| files_overlap(t, candidate)) {
            continue;
        }
        admitted.push(candidate);
    }

    admitted.into_iter().map(|t| t.id.clone()).collect()
}

/// True when every remaining task sits downstream of a failed task (via
/// explicit or implicit edges). Such tasks are unreachable rather than part
/// of a cycle.
fn blocked_by_failure(run: &Run, graph: &DependencyGraph, remaining: &[&str]) -> bool {
    let failed: HashSet<&str> = run
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .map(|t| t.id.as_str())
        .collect();
    if failed.is_empty() {
        return false;
    }

    remaining
        .iter()
        .all(|id| reaches_any(graph, id, &failed))
}

fn reaches_any(graph: &DependencyGraph, id: &str, targets: &HashSet<&str>) -> bool {
    let mut stack = vec![id.to_string()];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        for dep in graph.dependencies_of(&current) {
            if targets.contains(dep.as_str()) {
                return true;
            }
            stack.push(dep.clone());
        }
    }
    false
}
