// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid value for {var}: {message}")]
    EnvError { var: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
