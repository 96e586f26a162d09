//! Delayed and immediate task queue.
//!
//! Provides:
//! - FIFO queues with blocking pop
//! - Delayed tasks held in a per-queue scheduled set
//! - A scheduler that promotes due tasks atomically
//! - Worker pools with cancellation and bounded backoff
//! - Redis and in-memory stores behind one [`Store`] trait
//!
//! ## Tasks
//!
//! ```
//! use taskq_queue::Task;
//! use serde_json::json;
//!
//! let task = Task::new("42", "send_welcome", json!({"to": "user@example.com"}));
//! let wire = task.encode().unwrap();
//!
//! assert_eq!(Task::decode(&wire).unwrap(), task);
//! assert_eq!(task.retry, 0);
//! ```
//!
//! ## Delayed Tasks
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskq_queue::*;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> QueueResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let producer = Producer::new(store.clone());
//!
//! let task = Task::new("1", "reminder", json!(null));
//! producer.enqueue_delayed("emails", &task, Duration::from_secs(3600)).await?;
//!
//! assert_eq!(store.len("emails").await?, 0);
//! assert_eq!(store.scheduled_len("emails").await?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Complete Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskq_queue::*;
//! use taskq_redis::RedisConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let config = RedisStoreConfig::new(RedisConfig::new("localhost:6379"));
//!     let store: Arc<dyn Store> = Arc::new(RedisStore::open(config).await?);
//!
//!     Producer::new(store.clone())
//!         .enqueue("default", &Task::with_random_id("send_email", serde_json::json!({})))
//!         .await?;
//!
//!     let mut scheduler = Scheduler::new(store.clone(), ["default"], SchedulerConfig::default());
//!     scheduler.start()?;
//!
//!     let mut workers = WorkerPool::new(store.clone(), WorkerConfig::default());
//!     workers.register("default", |task| async move {
//!         tracing::info!(task_id = %task.id, "Handling task");
//!         Ok(())
//!     });
//!     workers.start()?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     workers.stop().await?;
//!     scheduler.stop().await?;
//!     store.close().await
//! }
//! ```

pub mod error;
pub mod memory;
pub mod producer;
pub mod redis_store;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryStore;
pub use producer::Producer;
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{SCHEDULED_SUFFIX, Store, scheduled_key};
pub use task::{Payload, Task};
pub use worker::{ConsumerState, RetryPolicy, TaskHandler, WorkerConfig, WorkerPool, WorkerStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::producer::Producer;
    pub use crate::scheduler::{Scheduler, SchedulerConfig};
    pub use crate::store::Store;
    pub use crate::task::Task;
    pub use crate::worker::{RetryPolicy, WorkerConfig, WorkerPool};
}
