//! Configuration for taskq deployments.
//!
//! A deployment file names the Redis server and the queues to serve:
//!
//! ```yaml
//! redis:
//!   addr: "localhost:6379"
//!   password: ""
//!   db: 0
//! tasks:
//!   - queue_name: "task_queue"
//! ```
//!
//! YAML, TOML and JSON files are accepted, chosen by extension. Values from
//! `TASKQ_*` environment variables (and a `.env` file) override the file.

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskq_queue::{RedisStoreConfig, RetryPolicy, SchedulerConfig, WorkerConfig};
use taskq_redis::RedisConfig;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "TASKQ";

/// One served queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Live queue name; the scheduled set is derived from it
    pub queue_name: String,

    /// Consumer loops for this queue
    #[serde(default = "default_consumers")]
    pub consumers: usize,
}

fn default_consumers() -> usize {
    1
}

impl QueueConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            consumers: default_consumers(),
        }
    }
}

/// Promotion loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub batch_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            batch_size: 100,
        }
    }
}

/// Consumer loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub block_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub task_timeout_secs: Option<u64>,
    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            block_timeout_ms: 1000,
            backoff_initial_ms: 100,
            backoff_max_ms: 30_000,
            task_timeout_secs: None,
            max_retries: 0,
            retry_base_delay_secs: 1,
        }
    }
}

/// HTTP ingress settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub listen: String,
    pub default_queue: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            default_queue: "task_queue".to_string(),
        }
    }
}

/// Complete deployment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub tasks: Vec<QueueConfig>,
    pub scheduler: SchedulerSettings,
    pub worker: WorkerSettings,
    pub http: HttpSettings,
}

impl AppConfig {
    /// Load a file, apply environment overrides and validate.
    ///
    /// A missing or invalid configuration is an error; nothing should start
    /// consuming without one.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config: AppConfig = ConfigLoader::auto(&path)?.load_file(&path)?;
        config.apply_env(&EnvLoader::new(ENV_PREFIX))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without touching the environment.
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        ConfigLoader::new(format).parse(content)
    }

    /// Apply `TASKQ_*` overrides.
    pub fn apply_env(&mut self, env: &EnvLoader) -> Result<()> {
        if let Some(addr) = env.var("redis_addr") {
            self.redis.addr = addr;
        }
        if let Some(password) = env.var("redis_password") {
            self.redis.password = Some(password);
        }
        if let Some(db) = env.parse("redis_db")? {
            self.redis.db = db;
        }
        if let Some(listen) = env.var("http_listen") {
            self.http.listen = listen;
        }
        Ok(())
    }

    /// Names of all configured queues, in file order.
    pub fn queue_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.queue_name.clone()).collect()
    }

    /// Whether `queue` is one of the configured queues.
    pub fn has_queue(&self, queue: &str) -> bool {
        self.tasks.iter().any(|t| t.queue_name == queue)
    }

    /// Total consumer loops across all queues.
    pub fn total_consumers(&self) -> usize {
        self.tasks.iter().map(|t| t.consumers).sum()
    }

    pub fn store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig::new(self.redis.clone()).with_promote_batch_size(self.scheduler.batch_size)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.scheduler.interval_secs),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let worker = &self.worker;
        WorkerConfig {
            consumers_per_queue: 1,
            block_timeout: Duration::from_millis(worker.block_timeout_ms),
            backoff_initial: Duration::from_millis(worker.backoff_initial_ms),
            backoff_max: Duration::from_millis(worker.backoff_max_ms),
            task_timeout: worker.task_timeout_secs.map(Duration::from_secs),
            retry: RetryPolicy::exponential(
                worker.max_retries,
                Duration::from_secs(worker.retry_base_delay_secs),
            ),
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.redis.addr, "redis.addr")?;

        if self.tasks.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one queue must be configured under tasks".to_string(),
            ));
        }
        for task in &self.tasks {
            ConfigValidator::not_empty(&task.queue_name, "tasks.queue_name")?;
            ConfigValidator::at_least(task.consumers, 1, "tasks.consumers")?;
        }
        ConfigValidator::unique(
            self.tasks.iter().map(|t| t.queue_name.as_str()),
            "queue name",
        )?;

        ConfigValidator::at_least(self.scheduler.interval_secs, 1, "scheduler.interval_secs")?;
        ConfigValidator::at_least(self.scheduler.batch_size, 1, "scheduler.batch_size")?;
        ConfigValidator::at_least(self.worker.block_timeout_ms, 1, "worker.block_timeout_ms")?;
        ConfigValidator::at_least(
            self.worker.backoff_max_ms,
            self.worker.backoff_initial_ms,
            "worker.backoff_max_ms",
        )?;

        // Every consumer holds one blocking connection while it waits.
        let needed = u32::try_from(self.total_consumers()).unwrap_or(u32::MAX);
        ConfigValidator::at_least(self.redis.pool_size, needed, "redis.pool_size")?;

        ConfigValidator::not_empty(&self.http.listen, "http.listen")?;
        let queues = self.queue_names();
        ConfigValidator::one_of(&self.http.default_queue, &queues, "http.default_queue")?;

        Ok(())
    }
}
