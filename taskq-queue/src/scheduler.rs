//! Periodic promotion of delayed tasks.

use crate::error::{QueueError, QueueResult};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between promotion ticks
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
        }
    }
}

/// Moves due entries from each queue's scheduled set into the queue.
///
/// Every tick calls [`Store::promote_due`] for each configured queue. A failed
/// promotion is logged and retried on the next tick; the loop only ends when
/// [`Scheduler::stop`] is called.
pub struct Scheduler {
    store: Arc<dyn Store>,
    queues: Vec<String>,
    config: SchedulerConfig,
    shutdown: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Create a scheduler for the given queues.
    pub fn new<I, S>(store: Arc<dyn Store>, queues: I, config: SchedulerConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues: Vec<String> = queues.into_iter().map(Into::into).collect();
        debug!(
            queues = ?queues,
            tick_interval = ?config.tick_interval,
            "Initializing scheduler"
        );
        Self {
            store,
            queues,
            config,
            shutdown: None,
            handle: None,
        }
    }

    /// Queues this scheduler promotes.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Run one promotion pass over every queue.
    ///
    /// Returns the total number of promoted tasks. Per-queue failures are
    /// logged and do not stop the pass.
    pub async fn tick(&self) -> usize {
        promote_all(self.store.as_ref(), &self.queues).await
    }

    /// Start the promotion loop.
    pub fn start(&mut self) -> QueueResult<()> {
        if self.is_running() {
            warn!("Scheduler already running");
            return Err(QueueError::SchedulerAlreadyRunning);
        }
        if self.config.tick_interval.is_zero() {
            return Err(QueueError::Config(
                "scheduler tick interval must be positive".to_string(),
            ));
        }

        let token = CancellationToken::new();
        let store = self.store.clone();
        let queues = self.queues.clone();
        let tick_interval = self.config.tick_interval;
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // A tick in progress finishes before shutdown is observed.
                promote_all(store.as_ref(), &queues).await;
            }

            debug!("Scheduler loop exited");
        });

        info!(
            queues = self.queues.len(),
            tick_interval = ?tick_interval,
            "Scheduler started"
        );
        self.shutdown = Some(token);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the promotion loop and wait for it to finish.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let (Some(token), Some(handle)) = (self.shutdown.take(), self.handle.take()) else {
            return Err(QueueError::SchedulerNotRunning);
        };

        info!("Stopping scheduler");
        token.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler loop ended abnormally");
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
    }
}

async fn promote_all(store: &dyn Store, queues: &[String]) -> usize {
    let mut total = 0;
    for queue in queues {
        match store.promote_due(queue).await {
            Ok(0) => {}
            Ok(count) => {
                info!(queue = %queue, count, "Promoted scheduled tasks");
                total += count;
            }
            Err(e) => error!(queue = %queue, error = %e, "Promotion failed"),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::task::Task;
    use serde_json::json;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_tick_promotes_every_queue() {
        let store = Arc::new(MemoryStore::new());
        for queue in ["a", "b"] {
            store
                .schedule(queue, &Task::new("1", "t", json!(null)), Duration::ZERO)
                .await
                .unwrap();
        }

        let scheduler = Scheduler::new(store.clone(), ["a", "b"], SchedulerConfig::default());
        assert_eq!(scheduler.tick().await, 2);
        assert_eq!(store.len("a").await.unwrap(), 1);
        assert_eq!(store.len("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_survives_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.close().await.unwrap();

        let scheduler = Scheduler::new(store, ["q"], SchedulerConfig::default());
        assert_eq!(scheduler.tick().await, 0);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            tick_interval: Duration::from_millis(10),
        };
        let mut scheduler = Scheduler::new(store.clone(), ["q"], config);

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start(),
            Err(QueueError::SchedulerAlreadyRunning)
        ));

        store
            .schedule("q", &Task::new("1", "t", json!(null)), Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len("q").await.unwrap(), 1);

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.stop().await,
            Err(QueueError::SchedulerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            tick_interval: Duration::ZERO,
        };
        let mut scheduler = Scheduler::new(store, ["q"], config);
        assert!(matches!(scheduler.start(), Err(QueueError::Config(_))));
    }
}
