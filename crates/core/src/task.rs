//! Task model - the unit of work that gets ranked.

use serde::{Deserialize, Deserializer, Serialize};
use crate::id::TaskId;

/// A task as persisted by the store.
///
/// Fields that may be absent or `null` in a stored record fall back to
/// their defaults: empty name, no deadline, zero urgency, `Pending`
/// status and no dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Display label
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    /// Due date as `YYYY-MM-DD`; may be malformed
    #[serde(default)]
    pub deadline: Option<String>,

    /// Caller-supplied raw urgency
    #[serde(default, deserialize_with = "nullable")]
    pub urgency_score: i64,

    /// Caller-supplied urgency, expected (not enforced) to be bounded
    #[serde(default, deserialize_with = "nullable")]
    pub normalized_urgency: f64,

    /// Current status
    #[serde(default, deserialize_with = "nullable")]
    pub status: TaskStatus,

    /// Tasks that must be completed before this one is ready
    #[serde(default, deserialize_with = "nullable")]
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Create a pending task with no deadline and no dependencies.
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            deadline: None,
            urgency_score: 0,
            normalized_urgency: 0.0,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
        }
    }

    /// Set the deadline.
    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = Some(deadline.into());
        self
    }

    /// Set both urgency inputs.
    pub fn with_urgency(mut self, urgency_score: i64, normalized_urgency: f64) -> Self {
        self.urgency_score = urgency_score;
        self.normalized_urgency = normalized_urgency;
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the dependencies.
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }
}

/// Task status.
///
/// The four known values parse case-insensitively. Any other string is
/// kept verbatim in [`TaskStatus::Other`] so records written by other
/// tools survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Not yet evaluated
    #[default]
    Pending,
    /// All dependencies are completed
    Ready,
    /// Waiting on at least one dependency
    Blocked,
    /// Past due, as marked by the caller
    Overdue,
    /// Unrecognized status string
    Other(String),
}

impl TaskStatus {
    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Blocked => "Blocked",
            Self::Overdue => "Overdue",
            Self::Other(s) => s,
        }
    }

    /// Whether this status marks the task overdue.
    pub fn is_overdue(&self) -> bool {
        match self {
            Self::Overdue => true,
            Self::Other(s) => s.eq_ignore_ascii_case("overdue"),
            _ => false,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "ready" => Self::Ready,
            "blocked" => Self::Blocked,
            "overdue" => Self::Overdue,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when a create payload is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// One or more required fields were absent or null
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// Payload for creating a task.
///
/// `name`, `deadline`, `urgency_score` and `normalized_urgency` are
/// required; the store rejects the payload otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Display label
    #[serde(default)]
    pub name: Option<String>,
    /// Due date
    #[serde(default)]
    pub deadline: Option<String>,
    /// Raw urgency
    #[serde(default)]
    pub urgency_score: Option<i64>,
    /// Normalized urgency
    #[serde(default)]
    pub normalized_urgency: Option<f64>,
    /// Initial status, `Pending` when absent
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Dependencies, empty when absent
    #[serde(default)]
    pub dependencies: Option<Vec<TaskId>>,
}

impl NewTask {
    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.deadline.is_none() {
            missing.push("deadline");
        }
        if self.urgency_score.is_none() {
            missing.push("urgency_score");
        }
        if self.normalized_urgency.is_none() {
            missing.push("normalized_urgency");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }

    /// Validate and build the stored record under `id`.
    pub fn into_task(self, id: TaskId) -> Result<Task, ValidationError> {
        self.validate()?;
        Ok(Task {
            id,
            name: self.name.unwrap_or_default(),
            deadline: self.deadline,
            urgency_score: self.urgency_score.unwrap_or_default(),
            normalized_urgency: self.normalized_urgency.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            dependencies: self.dependencies.unwrap_or_default(),
        })
    }
}

/// Partial update of a stored task.
///
/// Absent fields keep their stored value. Status is not part of the
/// patch: it is only ever derived by a prioritization run or set at
/// creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New display label
    #[serde(default)]
    pub name: Option<String>,
    /// New due date
    #[serde(default)]
    pub deadline: Option<String>,
    /// New raw urgency
    #[serde(default)]
    pub urgency_score: Option<i64>,
    /// New normalized urgency
    #[serde(default)]
    pub normalized_urgency: Option<f64>,
    /// New dependency list
    #[serde(default)]
    pub dependencies: Option<Vec<TaskId>>,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.deadline.is_none()
            && self.urgency_score.is_none()
            && self.normalized_urgency.is_none()
            && self.dependencies.is_none()
    }

    /// Apply the patch in place.
    pub fn apply(self, task: &mut Task) {
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(urgency_score) = self.urgency_score {
            task.urgency_score = urgency_score;
        }
        if let Some(normalized_urgency) = self.normalized_urgency {
            task.normalized_urgency = normalized_urgency;
        }
        if let Some(dependencies) = self.dependencies {
            task.dependencies = dependencies;
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
