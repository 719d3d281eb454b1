//! Transient types produced by a prioritization run.

use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use crate::{Task, TaskId, TaskStatus, Time};

/// Inputs shared by every task in one prioritization call.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Instant used for deadline math
    pub now: Time,
    /// Tasks the caller asserts are finished
    pub completed_ids: HashSet<TaskId>,
}

impl EvaluationContext {
    /// Context evaluated at the current wall-clock time.
    pub fn new(completed_ids: impl IntoIterator<Item = TaskId>) -> Self {
        Self::at(chrono::Utc::now(), completed_ids)
    }

    /// Context evaluated at a fixed instant.
    pub fn at(now: Time, completed_ids: impl IntoIterator<Item = TaskId>) -> Self {
        Self {
            now,
            completed_ids: completed_ids.into_iter().collect(),
        }
    }
}

/// A task plus the fields derived by a prioritization run.
///
/// Exactly one of `score` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTask {
    /// The evaluated task, with its status possibly updated
    #[serde(flatten)]
    pub task: Task,

    /// Score returned by the scorer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Why the task could not be scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnotatedTask {
    /// A successfully scored task with its derived status.
    pub fn scored(mut task: Task, score: f64, status: TaskStatus) -> Self {
        task.status = status;
        Self {
            task,
            score: Some(score),
            error: None,
        }
    }

    /// A task whose scoring failed. Its status is left untouched.
    pub fn failed(task: Task, error: impl Into<String>) -> Self {
        Self {
            task,
            score: None,
            error: Some(error.into()),
        }
    }

    /// Value used for ranking: the score, or `0` when scoring failed.
    pub fn ranking_score(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    /// Whether the task was scored and all its dependencies are completed.
    pub fn is_ready(&self) -> bool {
        self.score.is_some() && self.task.status == TaskStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scored_task_serializes_flat_without_error() {
        let task = Task::new(TaskId::new(1), "Plan sprint")
            .with_deadline("2099-01-01")
            .with_urgency(5, 0.9);
        let annotated = AnnotatedTask::scored(task, 50.0, TaskStatus::Ready);

        let value = serde_json::to_value(&annotated).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "Plan sprint",
                "deadline": "2099-01-01",
                "urgency_score": 5,
                "normalized_urgency": 0.9,
                "status": "Ready",
                "dependencies": [],
                "score": 50.0
            })
        );
    }

    #[test]
    fn test_failed_task_keeps_status_and_ranks_as_zero() {
        let task = Task::new(TaskId::new(2), "Broken").with_status(TaskStatus::Overdue);
        let annotated = AnnotatedTask::failed(task, "scorer exploded");

        assert_eq!(annotated.task.status, TaskStatus::Overdue);
        assert_eq!(annotated.ranking_score(), 0.0);
        assert!(!annotated.is_ready());

        let value = serde_json::to_value(&annotated).unwrap();
        assert!(value.get("score").is_none());
        assert_eq!(value["error"], "scorer exploded");
    }

    #[test]
    fn test_context_deduplicates_completed_ids() {
        let ctx = EvaluationContext::new([TaskId::new(1), TaskId::new(1), TaskId::new(2)]);
        assert_eq!(ctx.completed_ids.len(), 2);
    }
}
