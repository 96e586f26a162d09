//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store is unreachable or the command failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task processing failed
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Task processing exceeded its time limit
    #[error("Operation timeout")]
    Timeout,

    /// Worker pool not running
    #[error("Worker pool not running")]
    WorkerNotRunning,

    /// Worker pool already running
    #[error("Worker pool already running")]
    WorkerAlreadyRunning,

    /// Scheduler not running
    #[error("Scheduler not running")]
    SchedulerNotRunning,

    /// Scheduler already running
    #[error("Scheduler already running")]
    SchedulerAlreadyRunning,
}

impl QueueError {
    /// Build an execution failure from any displayable error.
    pub fn execution(error: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed(error.to_string())
    }

    /// Whether the error comes from the backing store and may clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<taskq_redis::RedisError> for QueueError {
    fn from(err: taskq_redis::RedisError) -> Self {
        match err {
            taskq_redis::RedisError::Config(msg) => Self::Config(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}
