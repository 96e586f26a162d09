//! Producer-side entry point.

use crate::error::QueueResult;
use crate::store::Store;
use crate::task::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Enqueues tasks on a store.
#[derive(Clone)]
pub struct Producer {
    store: Arc<dyn Store>,
}

impl Producer {
    /// Create a producer on the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Make a task available to consumers right away.
    pub async fn enqueue(&self, queue: &str, task: &Task) -> QueueResult<()> {
        self.store.push(queue, task).await
    }

    /// Make a task available once `delay` has passed and a promotion tick ran.
    ///
    /// A zero delay pushes the task straight onto the live queue.
    pub async fn enqueue_delayed(&self, queue: &str, task: &Task, delay: Duration) -> QueueResult<()> {
        if delay.is_zero() {
            return self.enqueue(queue, task).await;
        }
        debug!(queue = %queue, task_id = %task.id, delay = ?delay, "Enqueueing delayed task");
        self.store.schedule(queue, task, delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue() {
        let store = Arc::new(MemoryStore::new());
        let producer = Producer::new(store.clone());

        producer.enqueue("q", &Task::new("1", "a", json!(null))).await.unwrap();
        assert_eq!(store.len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_delayed_goes_to_scheduled_set() {
        let store = Arc::new(MemoryStore::new());
        let producer = Producer::new(store.clone());

        producer
            .enqueue_delayed("q", &Task::new("1", "a", json!(null)), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(store.len("q").await.unwrap(), 0);
        assert_eq!(store.scheduled_len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_delay_is_immediate() {
        let store = Arc::new(MemoryStore::new());
        let producer = Producer::new(store.clone());

        producer
            .enqueue_delayed("q", &Task::new("1", "a", json!(null)), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(store.len("q").await.unwrap(), 1);
        assert_eq!(store.scheduled_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let store = Arc::new(MemoryStore::new());
        store.close().await.unwrap();
        let producer = Producer::new(store);

        assert!(producer.enqueue("q", &Task::new("1", "a", json!(null))).await.is_err());
    }
}
