//! Redis configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{RedisError, Result};

/// Redis configuration.
///
/// Field names follow the deployment file format: `addr`, `password`, `db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server address, either `host:port` or a full `redis://` / `rediss://` URL.
    #[serde(alias = "url")]
    pub addr: String,
    /// Password. An empty string means no authentication.
    pub password: Option<String>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Logical database index.
    #[serde(alias = "database")]
    pub db: u8,
    /// Maximum number of dedicated connections used by blocking pops.
    pub pool_size: u32,
    /// Connection timeout.
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            password: None,
            username: None,
            db: 0,
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Create a new configuration for the given address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Build the full connection URL with credentials and database index.
    pub fn connection_url(&self) -> Result<String> {
        let addr = self.addr.trim();
        if addr.is_empty() {
            return Err(RedisError::Config("redis address is empty".to_string()));
        }

        let raw = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| RedisError::Config(format!("invalid redis address '{}': {}", addr, e)))?;

        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(RedisError::Config(format!(
                "unsupported scheme '{}', expected redis or rediss",
                url.scheme()
            )));
        }

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| RedisError::Config("cannot set password on address".to_string()))?;
        }

        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(username)
                .map_err(|_| RedisError::Config("cannot set username on address".to_string()))?;
        }

        url.set_path(&format!("/{}", self.db));

        Ok(url.to_string())
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the server address.
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the database index.
    pub fn db(mut self, db: u8) -> Self {
        self.config.db = db;
        self
    }

    /// Set the blocking pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisConfig {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
