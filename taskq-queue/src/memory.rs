//! In-process store for tests and local development.

use crate::error::{QueueError, QueueResult};
use crate::store::{Store, eligible_at, now_millis};
use crate::task::Task;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Default)]
struct MemoryState {
    /// Front is the newest entry, back the oldest.
    queues: HashMap<String, VecDeque<String>>,
    /// Entries as (eligible_at_ms, encoded task), sorted by timestamp.
    scheduled: HashMap<String, Vec<(i64, String)>>,
}

/// Store that keeps everything in memory.
///
/// Holds the same encoded strings a Redis store would, so malformed entries
/// and the wire format behave identically.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    pushed: Notify,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already-encoded entry to the live queue.
    pub(crate) fn push_raw(&self, queue: &str, raw: impl Into<String>) {
        self.state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(raw.into());
        self.pushed.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn schedule_raw(&self, queue: &str, raw: impl Into<String>, delay: Duration) {
        self.insert_scheduled(queue, eligible_at(delay), raw.into());
    }

    fn insert_scheduled(&self, queue: &str, at: i64, raw: String) {
        let mut state = self.state.lock();
        let entries = state.scheduled.entry(queue.to_string()).or_default();
        let index = entries.partition_point(|(existing, _)| *existing <= at);
        entries.insert(index, (at, raw));
    }

    fn try_pop(&self, queue: &str) -> Option<String> {
        self.state
            .lock()
            .queues
            .get_mut(queue)
            .and_then(|entries| entries.pop_back())
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Transport("store is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn push(&self, queue: &str, task: &Task) -> QueueResult<()> {
        self.ensure_open()?;
        let raw = task.encode()?;
        self.push_raw(queue, raw);
        debug!(queue = %queue, task_id = %task.id, "Task pushed");
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Option<Duration>) -> QueueResult<Option<Task>> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            self.ensure_open()?;

            // Register interest before checking, so a push between the check
            // and the await still wakes us.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(raw) = self.try_pop(queue) {
                return Task::decode(&raw).map(Some);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn schedule(&self, queue: &str, task: &Task, delay: Duration) -> QueueResult<()> {
        self.ensure_open()?;
        let raw = task.encode()?;
        let at = eligible_at(delay);
        self.insert_scheduled(queue, at, raw);
        debug!(queue = %queue, task_id = %task.id, eligible_at = at, "Task scheduled");
        Ok(())
    }

    async fn promote_due(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        let now = now_millis();

        // Claim and move in one critical section.
        let promoted = {
            let mut state = self.state.lock();
            let due: Vec<(i64, String)> = match state.scheduled.get_mut(queue) {
                Some(entries) => {
                    let split = entries.partition_point(|(at, _)| *at <= now);
                    entries.drain(..split).collect()
                }
                None => Vec::new(),
            };

            let mut promoted = 0;
            for (_, raw) in due {
                match Task::decode(&raw) {
                    Ok(task) => {
                        debug!(queue = %queue, task_id = %task.id, "Promoting scheduled task");
                        state
                            .queues
                            .entry(queue.to_string())
                            .or_default()
                            .push_front(raw);
                        promoted += 1;
                    }
                    Err(e) => warn!(queue = %queue, error = %e, "Dropping malformed scheduled entry"),
                }
            }
            promoted
        };

        if promoted > 0 {
            self.pushed.notify_waiters();
        }
        Ok(promoted)
    }

    async fn len(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        Ok(self.state.lock().queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn scheduled_len(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        Ok(self.state.lock().scheduled.get(queue).map_or(0, Vec::len))
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.pushed.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let store = MemoryStore::new();
        store.push("q", &Task::new("a", "first", json!(1))).await.unwrap();
        store.push("q", &Task::new("b", "second", json!(2))).await.unwrap();

        let first = store.pop("q", Some(Duration::ZERO)).await.unwrap().unwrap();
        let second = store.pop("q", Some(Duration::ZERO)).await.unwrap().unwrap();

        assert_eq!(first.id, "a");
        assert_eq!(second.id, "b");
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_queue() {
        let store = MemoryStore::new();
        let result = store.pop("q", Some(Duration::from_millis(20))).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_blocked_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.pop("q", None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push("q", &Task::new("1", "a", json!(null))).await.unwrap();

        let task = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(task.id, "1");
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let store = MemoryStore::new();
        store.push("one", &Task::new("1", "a", json!(null))).await.unwrap();

        assert!(store.pop("two", Some(Duration::ZERO)).await.unwrap().is_none());
        assert_eq!(store.len("one").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_consumed() {
        let store = MemoryStore::new();
        store.push_raw("q", "{broken");

        let result = store.pop("q", Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(QueueError::Deserialization(_))));
        assert_eq!(store.len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_promote_leaves_future_entries() {
        let store = MemoryStore::new();
        store
            .schedule("q", &Task::new("due", "a", json!(null)), Duration::ZERO)
            .await
            .unwrap();
        store
            .schedule("q", &Task::new("later", "b", json!(null)), Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(store.promote_due("q").await.unwrap(), 1);
        assert_eq!(store.scheduled_len("q").await.unwrap(), 1);

        let task = store.pop("q", Some(Duration::ZERO)).await.unwrap().unwrap();
        assert_eq!(task.id, "due");
    }

    #[tokio::test]
    async fn test_promote_skips_malformed_entries() {
        let store = MemoryStore::new();
        store.schedule_raw("q", "garbage", Duration::ZERO);
        store
            .schedule("q", &Task::new("ok", "a", json!(null)), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(store.promote_due("q").await.unwrap(), 1);
        assert_eq!(store.scheduled_len("q").await.unwrap(), 0);
        assert_eq!(store.len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promote_preserves_eligibility_order() {
        let store = MemoryStore::new();
        let second = Task::new("second", "b", json!(null)).encode().unwrap();
        let first = Task::new("first", "a", json!(null)).encode().unwrap();
        store.insert_scheduled("q", now_millis() - 10, second);
        store.insert_scheduled("q", now_millis() - 20, first);

        store.promote_due("q").await.unwrap();

        let first = store.pop("q", Some(Duration::ZERO)).await.unwrap().unwrap();
        assert_eq!(first.id, "first");
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        let result = store.push("q", &Task::new("1", "a", json!(null))).await;
        assert!(matches!(result, Err(QueueError::Transport(_))));
        assert!(store.pop("q", None).await.is_err());
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_pop() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.pop("q", None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close().await.unwrap();

        assert!(waiter.await.unwrap().is_err());
    }
}
