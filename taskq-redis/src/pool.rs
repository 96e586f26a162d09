//! Dedicated connections for blocking commands.
//!
//! A blocking command such as `BRPOP` occupies its connection on the server
//! until it returns, so it must never share the multiplexed command
//! connection. Each checkout from this pool is exclusive to one caller.

use bb8::{ManageConnection, Pool, PooledConnection};
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Client};
use std::ops::{Deref, DerefMut};
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the blocking connection pool.
pub type BlockingPool = Pool<BlockingConnectionManager>;

/// Creates connections without a response timeout, as required by blocking commands.
pub struct BlockingConnectionManager {
    client: Client,
    connection_config: AsyncConnectionConfig,
}

impl BlockingConnectionManager {
    /// Create a manager for the given client.
    pub fn new(client: Client, config: &RedisConfig) -> Self {
        let connection_config = AsyncConnectionConfig::new()
            .set_connection_timeout(Some(config.connection_timeout))
            .set_response_timeout(None);

        Self {
            client,
            connection_config,
        }
    }
}

impl ManageConnection for BlockingConnectionManager {
    type Connection = MultiplexedConnection;
    type Error = redis::RedisError;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        self.client
            .get_multiplexed_async_connection_with_config(&self.connection_config)
            .await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        redis::cmd("PING").query_async::<String>(conn).await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// A checked-out blocking connection.
pub struct BlockingConnection<'a> {
    conn: PooledConnection<'a, BlockingConnectionManager>,
}

impl<'a> BlockingConnection<'a> {
    /// Wrap a pooled connection.
    pub fn new(conn: PooledConnection<'a, BlockingConnectionManager>) -> Self {
        Self { conn }
    }
}

impl Deref for BlockingConnection<'_> {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for BlockingConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Builder for the blocking connection pool.
pub struct BlockingPoolBuilder {
    config: RedisConfig,
    client: Client,
}

impl BlockingPoolBuilder {
    /// Create a new pool builder.
    pub fn new(config: RedisConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Build the pool. Connections are opened lazily on first checkout.
    pub async fn build(self) -> Result<BlockingPool> {
        if self.config.pool_size == 0 {
            return Err(RedisError::Config("pool_size must be at least 1".to_string()));
        }

        let manager = BlockingConnectionManager::new(self.client, &self.config);

        let pool = Pool::builder()
            .max_size(self.config.pool_size)
            .min_idle(None)
            .connection_timeout(self.config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Pool(e.to_string()))?;

        info!(
            pool_size = self.config.pool_size,
            addr = %self.config.addr,
            "Blocking connection pool created"
        );

        Ok(pool)
    }
}
