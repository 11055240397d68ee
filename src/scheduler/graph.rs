//! Dependency graph construction
//!
//! Nodes are task ids; edges come from two sources:
//! 1. Explicit `depends_on` entries.
//! 2. Implicit edges between overlapping task pairs with no explicit edge in
//!    either direction, oriented from the higher-priority task (numerically
//!    smaller `priority`) to the other. Equal priorities orient by task-list
//!    insertion order, which is the run's stable ordering.
//!
//! Explicit edges alone must be acyclic; construction rejects cycles before
//! implicit edges are added.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;
use crate::models::Run;

use super::overlap::files_overlap;

#[derive(Debug)]
pub struct DependencyGraph {
    /// task id -> tasks it depends on
    dependencies: HashMap<String, Vec<String>>,
    /// task id -> tasks that depend on it
    dependents: HashMap<String, Vec<String>>,
}

static NO_EDGES: Vec<String> = Vec::new();

impl DependencyGraph {
    pub fn build(run: &Run) -> Result<Self, EngineError> {
        let mut graph = Self {
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
        };

        let ids: HashSet<&str> = run.tasks.iter().map(|t| t.id.as_str()).collect();
        for task in &run.tasks {
            graph.dependencies.entry(task.id.clone()).or_default();
            graph.dependents.entry(task.id.clone()).or_default();
        }

        // Explicit edges. Every target must name a task in the same run.
        for task in &run.tasks {
            for dep in &task.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(EngineError::TaskNotFound {
                        run_id: run.id.clone(),
                        task_id: dep.clone(),
                    });
                }
                graph.add_edge(dep, &task.id);
            }
        }

        graph.reject_cycles()?;

        // Implicit edges from file overlap, added pairwise in list order.
        for (i, earlier) in run.tasks.iter().enumerate() {
            for later in run.tasks.iter().skip(i + 1) {
                if graph.has_edge(&earlier.id, &later.id) || graph.has_edge(&later.id, &earlier.id)
                {
                    continue;
                }
                if !files_overlap(earlier, later) {
                    continue;
                }
                if earlier.priority <= later.priority {
                    graph.add_edge(&earlier.id, &later.id);
                } else {
                    graph.add_edge(&later.id, &earlier.id);
                }
            }
        }

        Ok(graph)
    }

    /// Tasks `id` depends on (explicit and implicit).
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).unwrap_or(&NO_EDGES)
    }

    /// Tasks depending on `id` (explicit and implicit).
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).unwrap_or(&NO_EDGES)
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.dependencies_of(id).len()
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.dependents
            .get(from)
            .is_some_and(|ds| ds.iter().any(|d| d == to))
    }

    /// `from` must complete before `to`.
    fn add_edge(&mut self, from: &str, to: &str) {
        if self.has_edge(from, to) {
            return;
        }
        self.dependents
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self.dependencies
            .entry(to.to_string())
            .or_default()
            .push(from.to_string());
    }

    /// Kahn's algorithm over the current (explicit-only at call time) edges.
    fn reject_cycles(&self) -> Result<(), EngineError> {
        let mut in_degree: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in self.dependents_of(id) {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited != self.dependencies.len() {
            let mut stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(id, _)| *id)
                .collect();
            stuck.sort_unstable();
            return Err(EngineError::DependencyCycle {
                tasks: stuck.join(", "),
            });
        }
        Ok(())
    }
}
