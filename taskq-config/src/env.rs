// Environment variable overrides

use crate::{ConfigError, Result};
use std::env;
use std::str::FromStr;

/// Reads prefixed environment variables, e.g. `TASKQ_REDIS_ADDR`.
pub struct EnvLoader {
    prefix: String,
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvLoader {
    /// Loader over the process environment
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |key| env::var(key).ok())
    }

    /// Loader over an arbitrary key source
    pub fn with_lookup<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
        }
    }

    /// Full variable name for `key`
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }

    /// Load a string variable, if set
    pub fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(&self.var_name(key))
    }

    /// Load and parse a variable, if set
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.var(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::EnvError {
                    var: self.var_name(key),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}
