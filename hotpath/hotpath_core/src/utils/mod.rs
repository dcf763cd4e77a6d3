//! Utility modules.
//!
//! - `config`: configuration types and TOML loading
//! - `logging`: log levels and the `log` facade bridge

pub mod config;
pub mod logging;

pub use config::{
    ArrayConfig, DictionaryConfig, ExecutorConfig, HotpathConfig, LockKind, LoggingConfig,
    PoolConfig,
};
pub use logging::{apply_level, LogLevel};
