//! Configuration types.
//!
//! Every container, pool and executor in the toolkit can be built from one
//! of these structs. They deserialize from TOML, and every field has a
//! default so a config file only needs to name what it changes:
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [pool]
//! lock = "spin"
//! max_idle = 256
//! ```

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use super::logging::LogLevel;
use crate::error::ConfigError;

/// The lock strategy a container is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Exclusive CAS spin lock. Trades CPU for latency, not reentrant.
    Spin,

    /// Reentrant read/write lock.
    #[default]
    ReentrantRw,

    /// Stamped lock with optimistic reads.
    Stamped,
}

/// Configuration for a concurrent array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Number of slots allocated up front
    pub initial_capacity: usize,

    /// Lock strategy guarding the array
    pub lock: LockKind,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 10,
            lock: LockKind::default(),
        }
    }
}

/// Configuration for a hash dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Number of buckets allocated up front, rounded up to a power of two
    pub initial_capacity: usize,

    /// Fraction of the bucket count the size may reach before the table grows
    pub load_factor: f32,

    /// Lock strategy guarding the dictionary
    pub lock: LockKind,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            load_factor: 0.75,
            lock: LockKind::default(),
        }
    }
}

/// Configuration for a reusable pool
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of instances to construct when the pool is created
    pub initial_size: usize,

    /// Upper bound on idle instances; `None` keeps everything returned
    pub max_idle: Option<usize>,

    /// Lock strategy guarding the idle set
    pub lock: LockKind,
}

/// Configuration for a single-thread executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Name of the executor, used as its thread group name
    pub name: String,

    /// Stack size of the worker thread in bytes
    pub stack_size: Option<usize>,

    /// Capacity reserved for the wait and run lists
    pub initial_queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "hotpath-executor".to_string(),
            stack_size: None,
            initial_queue_capacity: 64,
        }
    }
}

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level passed on to the installed logger
    pub level: LogLevel,
}

/// Top-level toolkit configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotpathConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Default array configuration
    pub array: ArrayConfig,

    /// Default dictionary configuration
    pub dictionary: DictionaryConfig,

    /// Default pool configuration
    pub pool: PoolConfig,

    /// Default executor configuration
    pub executor: ExecutorConfig,
}

impl HotpathConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.array.initial_capacity == 0 {
            return Err(ConfigError::Invalid(
                "array.initial_capacity must be greater than zero".to_string(),
            ));
        }

        let load_factor = self.dictionary.load_factor;
        if !load_factor.is_finite() || load_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "dictionary.load_factor must be positive, got {}",
                load_factor
            )));
        }

        if self.dictionary.initial_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dictionary.initial_capacity must be greater than zero".to_string(),
            ));
        }

        if let Some(max_idle) = self.pool.max_idle {
            if max_idle < self.pool.initial_size {
                return Err(ConfigError::Invalid(format!(
                    "pool.max_idle ({}) is smaller than pool.initial_size ({})",
                    max_idle, self.pool.initial_size
                )));
            }
        }

        if self.executor.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "executor.name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HotpathConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.array.lock, LockKind::ReentrantRw);
        assert_eq!(config.dictionary.initial_capacity, 16);
    }

    #[test]
    fn test_partial_toml() {
        let config = HotpathConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"

            [pool]
            lock = "spin"
            max_idle = 128

            [dictionary]
            lock = "stamped"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.pool.lock, LockKind::Spin);
        assert_eq!(config.pool.max_idle, Some(128));
        assert_eq!(config.dictionary.lock, LockKind::Stamped);
        assert_eq!(config.dictionary.load_factor, 0.75);
        assert_eq!(config.executor.name, "hotpath-executor");
    }

    #[test]
    fn test_invalid_load_factor() {
        let result = HotpathConfig::from_toml_str(
            r#"
            [dictionary]
            load_factor = 0.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_max_idle_below_initial_size() {
        let mut config = HotpathConfig::default();
        config.pool.initial_size = 8;
        config.pool.max_idle = Some(4);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = HotpathConfig::from_toml_str("[pool\nlock = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_lock_kind() {
        let result = HotpathConfig::from_toml_str(
            r#"
            [array]
            lock = "mutex"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
