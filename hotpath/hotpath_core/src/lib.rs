//! # Hotpath Core
//!
//! `hotpath_core` holds the pieces of the hotpath toolkit that every other
//! crate agrees on: the error hierarchy, the reuse contract for pooled
//! objects, and the configuration types used to build containers, pools and
//! executors.
//!
//! The toolkit itself targets latency-sensitive servers that would rather
//! borrow and return objects than allocate on every request. The concurrency
//! primitives live in `hotpath_concurrency`; this crate has no threads and
//! no locks of its own.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all hotpath components
//! - **traits**: The `Reusable` contract for pooled objects
//! - **utils**: Configuration and logging helpers

pub mod error;
pub mod traits;
pub mod utils;

// Re-export key types and traits for convenience
pub use error::{
    ConfigError, ContainerError, Error, ExecutorError, LifecycleError, LockError, PoolError, Result,
};
pub use traits::Reusable;
pub use utils::{
    ArrayConfig, DictionaryConfig, ExecutorConfig, HotpathConfig, LockKind, LogLevel,
    LoggingConfig, PoolConfig,
};
