//! taskrank core data models.
//!
//! This crate defines the task record shared by the store, the
//! prioritization engine and the transport, plus the transient
//! evaluation types produced by a prioritization run.

#![warn(missing_docs)]

// Core identities
mod id;

// Task records and payloads
mod task;

// Evaluation results
mod evaluation;

// Re-exports
pub use id::TaskId;

pub use task::{NewTask, Task, TaskPatch, TaskStatus, ValidationError};
pub use evaluation::{AnnotatedTask, EvaluationContext};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
