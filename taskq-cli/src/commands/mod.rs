//! Subcommand implementations.

pub mod enqueue;
pub mod promote;
pub mod run;
pub mod stats;

use anyhow::Context;
use std::sync::Arc;
use taskq_config::AppConfig;
use taskq_queue::{RedisStore, Store};

/// Open the Redis store described by the configuration.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let store = RedisStore::open(config.store_config())
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.redis.addr))?;
    Ok(Arc::new(store))
}
