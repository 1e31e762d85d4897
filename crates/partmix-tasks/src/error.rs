//! Error types for task execution and the storage collaborators.

use crate::model::{TaskId, TaskStatus};
use partmix_core::PartmixError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while scheduling or running track tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A referenced record or media object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional write used a stale version token.
    #[error("Version conflict writing {0}")]
    Conflict(String),

    /// The track lock could not be acquired before the deadline.
    #[error("Timed out after {waited:?} waiting for the lock on {track}")]
    LockTimeout { track: String, waited: Duration },

    /// Validation of the task's inputs failed.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Task {0} already exists")]
    TaskExists(TaskId),

    #[error("Task {0} does not exist")]
    TaskMissing(TaskId),

    /// A state transition not allowed by the task lifecycle.
    #[error("Task {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// The task body panicked; the panic was contained to the task.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The executor shut down before the task reported a result.
    #[error("Task worker stopped before reporting a result")]
    WorkerGone,

    /// Mixing or audio processing failed.
    #[error(transparent)]
    Audio(#[from] PartmixError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Whether rescheduling the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Conflict(_))
    }
}

/// Result type alias for task operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;
