//! # taskq Redis
//!
//! Connection handling for the Redis-backed task store.
//!
//! ## Features
//!
//! - **Shared command connection**: an auto-reconnecting `ConnectionManager`
//!   for non-blocking commands (`LPUSH`, `ZADD`, scripts)
//! - **Blocking pool**: exclusive connections without a response timeout for
//!   `BRPOP`, pooled with bb8
//! - **Deployment config**: `addr` / `password` / `db` as found in config files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskq_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .addr("localhost:6379")
//!         .db(0)
//!         .pool_size(4)
//!         .build();
//!
//!     let redis = RedisService::open(config).await?;
//!     redis.health_check().await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{BlockingConnection, BlockingConnectionManager, BlockingPool};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;
