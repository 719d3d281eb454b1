//! Storage trait abstraction.

use async_trait::async_trait;
use taskrank_core::{NewTask, Task, TaskId, TaskPatch, ValidationError};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Create payload rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Task not found
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task store.
///
/// The store owns identifier assignment: `create_task` hands out a fresh
/// id and callers never choose one.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List every task, ordered by id.
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Load a task by ID.
    async fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Validate the payload and persist it under a new id.
    async fn create_task(&mut self, new_task: NewTask) -> Result<Task>;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    async fn update_task(&mut self, id: TaskId, patch: TaskPatch) -> Result<Task>;

    /// Delete a task. Fails with `NotFound` for unknown ids.
    async fn delete_task(&mut self, id: TaskId) -> Result<()>;
}
