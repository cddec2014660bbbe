//! Configuration
//!
//! [`HostConfig`] tunes the reference host; [`SpiConfig`] tunes a single
//! executor. Both have working defaults, so configuration is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reference host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum number of simultaneously open (nested) connections
    pub max_connections: usize,
    /// Hand freed addresses out again, most recently freed first
    pub recycle_addresses: bool,
    /// Name of the long-lived arena kept plans are promoted into
    pub cache_arena_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            recycle_addresses: true,
            cache_arena_name: "CacheMemoryContext".to_string(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn recycle_addresses(mut self, recycle: bool) -> Self {
        self.recycle_addresses = recycle;
        self
    }

    pub fn cache_arena_name(mut self, name: impl Into<String>) -> Self {
        self.cache_arena_name = name.into();
        self
    }

    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: HostConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.cache_arena_name.trim().is_empty() {
            return Err(Error::Config(
                "cache_arena_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-executor settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// Maximum rows returned per execution; 0 means unlimited
    pub row_limit: usize,
}

impl SpiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_limit(mut self, limit: usize) -> Self {
        self.row_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.max_connections, 16);
        assert!(config.recycle_addresses);
        assert_eq!(config.cache_arena_name, "CacheMemoryContext");
        assert_eq!(SpiConfig::default().row_limit, 0);
    }

    #[test]
    fn test_partial_json() {
        let config = HostConfig::from_json(r#"{ "max_connections": 2 }"#).unwrap();
        assert_eq!(config.max_connections, 2);
        assert!(config.recycle_addresses);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            HostConfig::from_json(r#"{ "max_connections": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HostConfig::from_json("not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = HostConfig::new()
            .max_connections(4)
            .recycle_addresses(false)
            .cache_arena_name("Cache");
        assert_eq!(config.max_connections, 4);
        assert!(!config.recycle_addresses);
        assert_eq!(config.cache_arena_name, "Cache");
        assert_eq!(SpiConfig::new().row_limit(10).row_limit, 10);
    }
}
