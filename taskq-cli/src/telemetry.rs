//! Log subscriber setup.
//!
//! - `TASKQ_LOG_LEVEL=trace|debug|info|warn|error` - Set log level
//! - `TASKQ_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `RUST_LOG` - Full filter directives, overrides `TASKQ_LOG_LEVEL`

use anyhow::anyhow;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pretty,
    Compact,
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub format: Format,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let level = lookup("TASKQ_LOG_LEVEL")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| matches!(s.as_str(), "trace" | "debug" | "info" | "warn" | "error"))
            .unwrap_or(defaults.level);

        let format = lookup("TASKQ_LOG_FORMAT")
            .and_then(|s| Format::parse(s.trim()))
            .unwrap_or(defaults.format);

        Self { level, format }
    }
}

/// Install the global subscriber. Logs go to stderr.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        Format::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        Format::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        Format::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
