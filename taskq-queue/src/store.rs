//! Backing store abstraction.

use crate::error::QueueResult;
use crate::task::Task;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Suffix appended to a queue name to form its scheduled set.
pub const SCHEDULED_SUFFIX: &str = "-scheduled";

/// Name of the scheduled set that belongs to `queue`.
pub fn scheduled_key(queue: &str) -> String {
    format!("{}{}", queue, SCHEDULED_SUFFIX)
}

/// Eligibility timestamp, in Unix milliseconds, for a task delayed by `delay`.
pub(crate) fn eligible_at(delay: Duration) -> i64 {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(delay_ms)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Ordered task transport plus delayed delivery.
///
/// Every queue is a FIFO list; every queue `Q` has a scheduled set `Q-scheduled`
/// holding tasks until their eligibility time. Implementations must make
/// [`Store::promote_due`] claim due entries atomically so that concurrent
/// promoters never deliver the same entry twice.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a task to the live queue. Does not wait for a consumer.
    async fn push(&self, queue: &str, task: &Task) -> QueueResult<()>;

    /// Remove the oldest task from the live queue.
    ///
    /// Waits until a task is available. With `timeout: None` the wait is
    /// unbounded and the call only returns `Ok(Some(_))` or an error; with a
    /// bound it returns `Ok(None)` when nothing arrived in time. An entry that
    /// does not decode is consumed and reported as `Deserialization`.
    async fn pop(&self, queue: &str, timeout: Option<Duration>) -> QueueResult<Option<Task>>;

    /// Hold a task in the scheduled set until `now + delay`.
    async fn schedule(&self, queue: &str, task: &Task, delay: Duration) -> QueueResult<()>;

    /// Move every due entry of the scheduled set into the live queue.
    ///
    /// Returns the number of tasks promoted. Malformed entries are logged and
    /// dropped without stopping the promotion of the others.
    async fn promote_due(&self, queue: &str) -> QueueResult<usize>;

    /// Number of tasks waiting in the live queue.
    async fn len(&self, queue: &str) -> QueueResult<usize>;

    /// Number of tasks waiting in the scheduled set.
    async fn scheduled_len(&self, queue: &str) -> QueueResult<usize>;

    /// Release the store. Later operations fail with a transport error.
    async fn close(&self) -> QueueResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_key() {
        assert_eq!(scheduled_key("q"), "q-scheduled");
        assert_eq!(scheduled_key("task_queue"), "task_queue-scheduled");
    }

    #[test]
    fn test_eligible_at_is_in_the_future() {
        let before = now_millis();
        let at = eligible_at(Duration::from_secs(10));
        assert!(at >= before + 10_000);
    }

    #[test]
    fn test_eligible_at_saturates() {
        assert_eq!(eligible_at(Duration::MAX), i64::MAX);
    }
}
