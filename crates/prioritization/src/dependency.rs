//! Dependency resolution for tasks.

use std::collections::HashSet;
use taskrank_core::{Task, TaskId};

/// Result of dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// All dependencies completed, ready to work on
    Ready,
    /// Waiting on these tasks, in declaration order without repeats
    Blocked(Vec<TaskId>),
}

/// Resolves task readiness against a set of completed tasks.
///
/// Readiness is plain set containment: dependency order and duplicates
/// do not matter, and a task with no dependencies is always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Whether every dependency of `task` is in `completed`.
    pub fn is_ready(&self, task: &Task, completed: &HashSet<TaskId>) -> bool {
        task.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Resolve `task`, listing the dependencies still outstanding.
    pub fn check(&self, task: &Task, completed: &HashSet<TaskId>) -> Resolution {
        let mut seen = HashSet::new();
        let unmet: Vec<_> = task
            .dependencies
            .iter()
            .copied()
            .filter(|dep| !completed.contains(dep) && seen.insert(*dep))
            .collect();

        if unmet.is_empty() {
            Resolution::Ready
        } else {
            Resolution::Blocked(unmet)
        }
    }
}
