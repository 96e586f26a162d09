//! Worker pool for consuming tasks.

use crate::error::{QueueError, QueueResult};
use crate::store::Store;
use crate::task::Task;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Task handler function type.
pub type TaskHandler =
    Arc<dyn Fn(Task) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Requeue policy for failed tasks.
///
/// The default never retries: a failed task is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one. Zero disables retries.
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for the retry delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Policy that drops every failed task.
    pub fn none() -> Self {
        Self::default()
    }

    /// Retry up to `max_retries` times, doubling the delay from `base_delay`.
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Cap the retry delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Whether a failed task gets another attempt.
    pub fn should_retry(&self, task: &Task) -> bool {
        task.retry < self.max_retries
    }

    /// Delay before re-running a task that failed on attempt `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer loops per queue unless overridden at registration
    pub consumers_per_queue: usize,

    /// Upper bound on a single blocking pop, so loops notice shutdown
    pub block_timeout: Duration,

    /// First delay after a transport failure on pop
    pub backoff_initial: Duration,

    /// Largest delay between pop attempts during an outage
    pub backoff_max: Duration,

    /// Time limit for one handler invocation
    pub task_timeout: Option<Duration>,

    /// What to do with failed tasks
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumers_per_queue: 1,
            block_timeout: Duration::from_secs(1),
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
            task_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential delay that doubles on each failure and resets on success.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2),
        }
        .min(self.max);
        self.current = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

/// Where a consumer loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    /// Between tasks
    Idle = 0,
    /// Waiting for the store to hand out a task
    BlockedOnPop = 1,
    /// Running the handler
    Processing = 2,
    /// Loop has exited
    Stopped = 3,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::BlockedOnPop,
            2 => Self::Processing,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ConsumerState::Idle as u8))
    }

    fn set(&self, state: ConsumerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> ConsumerState {
        ConsumerState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Snapshot of worker pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks whose handler succeeded
    pub processed: u64,
    /// Tasks whose handler failed, panicked or timed out
    pub failed: u64,
    /// Failed pops, including undecodable entries
    pub pop_errors: u64,
    /// Failed tasks rescheduled under the retry policy
    pub retried: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    pop_errors: AtomicU64,
    retried: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pop_errors: self.pop_errors.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

struct Registration {
    handler: TaskHandler,
    consumers: usize,
}

struct Consumer {
    queue: String,
    index: usize,
    state: Arc<StateCell>,
}

/// Everything one consumer loop needs.
struct ConsumerContext {
    queue: String,
    index: usize,
    store: Arc<dyn Store>,
    handler: TaskHandler,
    config: WorkerConfig,
    state: Arc<StateCell>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

/// Pool of consumer loops, each popping from one queue.
///
/// A dequeued task is handed to the handler registered for its queue. On
/// success or failure alike the task is gone from the store; failures are
/// only logged unless a [`RetryPolicy`] is configured.
pub struct WorkerPool {
    store: Arc<dyn Store>,
    config: WorkerConfig,
    registrations: BTreeMap<String, Registration>,
    consumers: Vec<Consumer>,
    counters: Arc<Counters>,
    shutdown: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a worker pool on the given store.
    pub fn new(store: Arc<dyn Store>, config: WorkerConfig) -> Self {
        Self {
            store,
            config,
            registrations: BTreeMap::new(),
            consumers: Vec::new(),
            counters: Arc::new(Counters::default()),
            shutdown: None,
            handles: Vec::new(),
        }
    }

    /// Register the handler for a queue.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use taskq_queue::*;
    ///
    /// # async fn example() -> QueueResult<()> {
    /// let store = Arc::new(MemoryStore::new());
    /// let mut pool = WorkerPool::new(store, WorkerConfig::default());
    ///
    /// pool.register("emails", |task| async move {
    ///     tracing::info!(task_id = %task.id, "Sending email");
    ///     Ok(())
    /// });
    ///
    /// pool.start()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn register<F, Fut>(&mut self, queue: impl Into<String>, handler: F)
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let consumers = self.config.consumers_per_queue;
        self.register_with_consumers(queue, consumers, handler);
    }

    /// Register the handler for a queue with its own number of consumers.
    pub fn register_with_consumers<F, Fut>(
        &mut self,
        queue: impl Into<String>,
        consumers: usize,
        handler: F,
    ) where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(
            move |task: Task| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
                Box::pin(handler(task))
            },
        );
        self.register_handler(queue, consumers, handler);
    }

    /// Register an already boxed handler.
    pub fn register_handler(
        &mut self,
        queue: impl Into<String>,
        consumers: usize,
        handler: TaskHandler,
    ) {
        let queue = queue.into();
        if self.registrations.contains_key(&queue) {
            warn!(queue = %queue, "Replacing handler for queue");
        }
        debug!(queue = %queue, consumers, "Handler registered");
        self.registrations
            .insert(queue, Registration { handler, consumers });
    }

    /// Queues with a registered handler.
    pub fn queues(&self) -> Vec<String> {
        self.registrations.keys().cloned().collect()
    }

    /// Start one loop per consumer.
    pub fn start(&mut self) -> QueueResult<()> {
        if self.shutdown.is_some() {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        if self.registrations.is_empty() {
            return Err(QueueError::Config("no queue handlers registered".to_string()));
        }
        if let Some((queue, _)) = self.registrations.iter().find(|(_, r)| r.consumers == 0) {
            return Err(QueueError::Config(format!(
                "queue '{}' needs at least one consumer",
                queue
            )));
        }

        let token = CancellationToken::new();
        self.consumers.clear();

        for (queue, registration) in &self.registrations {
            for index in 0..registration.consumers {
                let state = Arc::new(StateCell::new());
                let ctx = ConsumerContext {
                    queue: queue.clone(),
                    index,
                    store: self.store.clone(),
                    handler: registration.handler.clone(),
                    config: self.config.clone(),
                    state: state.clone(),
                    counters: self.counters.clone(),
                    shutdown: token.clone(),
                };

                self.handles.push(tokio::spawn(consume(ctx)));
                self.consumers.push(Consumer {
                    queue: queue.clone(),
                    index,
                    state,
                });
            }
        }

        info!(
            queues = self.registrations.len(),
            consumers = self.consumers.len(),
            "Worker pool started"
        );
        self.shutdown = Some(token);
        Ok(())
    }

    /// Signal every loop to stop and wait for in-flight tasks to finish.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let Some(token) = self.shutdown.take() else {
            return Err(QueueError::WorkerNotRunning);
        };

        info!("Stopping worker pool");
        token.cancel();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Consumer loop ended abnormally");
            }
        }

        info!(stats = ?self.stats(), "Worker pool stopped");
        Ok(())
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Current counters.
    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// State of every consumer as `(queue, index, state)`.
    pub fn consumer_states(&self) -> Vec<(String, usize, ConsumerState)> {
        self.consumers
            .iter()
            .map(|c| (c.queue.clone(), c.index, c.state.get()))
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
    }
}

async fn consume(ctx: ConsumerContext) {
    let mut backoff = Backoff::new(ctx.config.backoff_initial, ctx.config.backoff_max);
    debug!(queue = %ctx.queue, consumer = ctx.index, "Consumer started");

    // Pops are bounded rather than raced against the token, so a task the
    // store already handed out is never abandoned mid-flight.
    while !ctx.shutdown.is_cancelled() {
        ctx.state.set(ConsumerState::BlockedOnPop);
        let popped = ctx
            .store
            .pop(&ctx.queue, Some(ctx.config.block_timeout))
            .await;

        match popped {
            Ok(Some(task)) => {
                backoff.reset();
                ctx.state.set(ConsumerState::Processing);
                process(&ctx, task).await;
                ctx.state.set(ConsumerState::Idle);
            }
            Ok(None) => {
                backoff.reset();
                ctx.state.set(ConsumerState::Idle);
            }
            Err(e) if e.is_transient() => {
                ctx.counters.pop_errors.fetch_add(1, Ordering::Relaxed);
                ctx.state.set(ConsumerState::Idle);
                let delay = backoff.next_delay();
                warn!(
                    queue = %ctx.queue,
                    consumer = ctx.index,
                    error = %e,
                    retry_in = ?delay,
                    "Failed to pop task"
                );
                tokio::select! {
                    _ = ctx.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                ctx.counters.pop_errors.fetch_add(1, Ordering::Relaxed);
                ctx.state.set(ConsumerState::Idle);
                warn!(
                    queue = %ctx.queue,
                    consumer = ctx.index,
                    error = %e,
                    "Discarding undecodable task"
                );
            }
        }
    }

    ctx.state.set(ConsumerState::Stopped);
    debug!(queue = %ctx.queue, consumer = ctx.index, "Consumer stopped");
}

async fn process(ctx: &ConsumerContext, task: Task) {
    debug!(
        queue = %ctx.queue,
        consumer = ctx.index,
        task_id = %task.id,
        task_name = %task.name,
        "Processing task"
    );

    // Spawned so a panicking handler fails the task instead of the loop.
    let run = tokio::spawn((ctx.handler)(task.clone()));

    let result = match ctx.config.task_timeout {
        Some(limit) => {
            let abort = run.abort_handle();
            match tokio::time::timeout(limit, run).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    abort.abort();
                    Err(QueueError::Timeout)
                }
            }
        }
        None => flatten(run.await),
    };

    match result {
        Ok(()) => {
            ctx.counters.processed.fetch_add(1, Ordering::Relaxed);
            debug!(queue = %ctx.queue, task_id = %task.id, "Task completed");
        }
        Err(e) => {
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                queue = %ctx.queue,
                task_id = %task.id,
                task_name = %task.name,
                retry = task.retry,
                error = %e,
                "Task failed"
            );
            requeue_or_drop(ctx, &task).await;
        }
    }
}

fn flatten(joined: Result<QueueResult<()>, JoinError>) -> QueueResult<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(QueueError::execution("handler panicked")),
        Err(e) => Err(QueueError::execution(e)),
    }
}

async fn requeue_or_drop(ctx: &ConsumerContext, task: &Task) {
    let policy = &ctx.config.retry;
    if !policy.should_retry(task) {
        if policy.max_retries > 0 {
            warn!(queue = %ctx.queue, task_id = %task.id, "Retries exhausted, dropping task");
        }
        return;
    }

    let delay = policy.delay_for(task.retry);
    let next = task.next_attempt();
    match ctx.store.schedule(&ctx.queue, &next, delay).await {
        Ok(()) => {
            ctx.counters.retried.fetch_add(1, Ordering::Relaxed);
            info!(
                queue = %ctx.queue,
                task_id = %next.id,
                retry = next.retry,
                delay = ?delay,
                "Task rescheduled"
            );
        }
        Err(e) => error!(
            queue = %ctx.queue,
            task_id = %task.id,
            error = %e,
            "Failed to reschedule task, dropping it"
        ),
    }
}
