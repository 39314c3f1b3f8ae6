// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Engine configuration.
//!
//! Defaults are usable as-is. A JSON file can override any subset of fields
//! and `BROOK_*` environment variables override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub page_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppenderConfig {
    /// Largest transactional batch the store accepts, head and marker included.
    pub max_batch_operations: usize,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            max_batch_operations: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Brooks kept in the in-memory model cache.
    pub cache_capacity: usize,
    pub persist: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub reader: ReaderConfig,
    pub appender: AppenderConfig,
    pub snapshots: SnapshotConfig,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BROOK_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_var(&lookup, "BROOK_MAX_RETRIES", &mut self.retry.max_retries)?;
        override_var(&lookup, "BROOK_BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        override_var(&lookup, "BROOK_MAX_DELAY_MS", &mut self.retry.max_delay_ms)?;
        override_var(&lookup, "BROOK_PAGE_SIZE", &mut self.reader.page_size)?;
        override_var(
            &lookup,
            "BROOK_MAX_BATCH_OPERATIONS",
            &mut self.appender.max_batch_operations,
        )?;
        override_var(&lookup, "BROOK_CACHE_CAPACITY", &mut self.snapshots.cache_capacity)?;
        override_var(&lookup, "BROOK_PERSIST_SNAPSHOTS", &mut self.snapshots.persist)?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reader.page_size == 0 {
            return Err(ConfigError::Invalid("reader.page_size must be > 0".into()));
        }
        // An append of one event needs event + head + marker.
        if self.appender.max_batch_operations < 3 {
            return Err(ConfigError::Invalid(
                "appender.max_batch_operations must be >= 3".into(),
            ));
        }
        if self.snapshots.cache_capacity == 0 {
            return Err(ConfigError::Invalid("snapshots.cache_capacity must be > 0".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

fn override_var<F, T>(lookup: &F, var: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.reader.page_size, 100);
        assert_eq!(config.appender.max_batch_operations, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reader": {{"page_size": 7}}}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reader.page_size, 7);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            [("BROOK_MAX_RETRIES", "5"), ("BROOK_PERSIST_SNAPSHOTS", "false")].into();

        let config = EngineConfig::default()
            .with_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert!(!config.snapshots.persist);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let result = EngineConfig::default().with_overrides(|var| {
            (var == "BROOK_PAGE_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = EngineConfig::default().with_overrides(|var| {
            (var == "BROOK_PAGE_SIZE").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
