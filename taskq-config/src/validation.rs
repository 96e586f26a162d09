// Configuration validation

use crate::{ConfigError, Result};
use std::collections::HashSet;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is at least `min`
    pub fn at_least<T: PartialOrd + std::fmt::Display>(value: T, min: T, field: &str) -> Result<()> {
        if value < min {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least {}, got {}",
                field, min, value
            )));
        }
        Ok(())
    }

    /// Validate that no value appears twice
    pub fn unique<'a>(values: impl IntoIterator<Item = &'a str>, field: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for value in values {
            if !seen.insert(value) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate {} '{}'",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of the allowed values",
                field
            )));
        }
        Ok(())
    }
}
