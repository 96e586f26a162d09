// Configuration file loaders

use crate::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(FileFormat::Yaml),
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Load and deserialize a configuration file
    pub fn load_file<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse and deserialize configuration from a string
    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        let value = self.parse_value(content)?;
        serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(format!("Invalid configuration: {}", e)))
    }

    /// Parse into a format-neutral tree
    pub fn parse_value(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Yaml => self.parse_yaml(content)?,
            FileFormat::Toml => self.parse_toml(content)?,
            FileFormat::Json => self.parse_json(content)?,
        };

        // An empty YAML document means "all defaults".
        Ok(if value.is_null() {
            Value::Object(Default::default())
        } else {
            value
        })
    }

    fn parse_yaml(&self, content: &str) -> Result<Value> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("YAML parse error: {}", e)))
    }

    fn parse_toml(&self, content: &str) -> Result<Value> {
        let toml_value: toml::Value = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        serde_json::to_value(toml_value)
            .map_err(|e| ConfigError::ParseError(format!("TOML conversion error: {}", e)))
    }

    fn parse_json(&self, content: &str) -> Result<Value> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))
    }
}
