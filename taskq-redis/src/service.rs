//! Redis service owning every connection the queue uses.

use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::{debug, info};

use crate::{
    RedisConfig, RedisError, Result,
    pool::{BlockingConnection, BlockingPool, BlockingPoolBuilder},
};

/// Redis service providing the shared command connection and the blocking pool.
///
/// Created once at startup and handed to the components that need it.
#[derive(Clone)]
pub struct RedisService {
    config: RedisConfig,
    connection: ConnectionManager,
    blocking: BlockingPool,
}

impl RedisService {
    /// Open connections to the configured server.
    pub async fn open(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url()?;
        debug!(addr = %config.addr, db = config.db, "Opening Redis connections");

        let client = Client::open(url.as_str()).map_err(|e| RedisError::Config(e.to_string()))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Some(config.connection_timeout));
        let connection = ConnectionManager::new_with_config(client.clone(), manager_config)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let blocking = BlockingPoolBuilder::new(config.clone(), client).build().await?;

        let service = Self {
            config,
            connection,
            blocking,
        };
        service.health_check().await?;

        info!(addr = %service.config.addr, db = service.config.db, "Redis service ready");
        Ok(service)
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Handle to the shared, auto-reconnecting command connection.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Check out a dedicated connection for a blocking command.
    pub async fn blocking(&self) -> Result<BlockingConnection<'_>> {
        let conn = self.blocking.get().await?;
        Ok(BlockingConnection::new(conn))
    }

    /// Check if the server answers.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Get blocking pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let state = self.blocking.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }
}

/// Blocking pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections.
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}
