//! Redis error types.

use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl<E> From<bb8::RunError<E>> for RedisError
where
    E: std::fmt::Display,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::User(e) => Self::Connection(e.to_string()),
            bb8::RunError::TimedOut => {
                Self::Pool("timed out waiting for a blocking connection".to_string())
            }
        }
    }
}
