//! Error types for the hotpath toolkit.
//!
//! Each subsystem has its own error enum. The root `Error` wraps all of
//! them so callers that mix containers, pools and executors can use a
//! single `Result` type.
//!
//! Only recoverable conditions are represented here. Releasing a lock that
//! is not held, or handing back a stamp that does not belong to the lock,
//! is a programming error and panics at the call site instead.

use thiserror::Error;

/// Root error type for the hotpath toolkit.
#[derive(Debug, Error)]
pub enum Error {
    /// Lock strategy errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Container access errors
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Reusable pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Counted lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Executor errors
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unimplemented features
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Errors returned by lock strategies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The requested acquisition mode is not supported by any strategy
    #[error("Unsupported lock operation: {0}")]
    Unsupported(&'static str),
}

/// Errors related to container access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Index is outside of `[0, size)`
    #[error("Index {index} out of bounds for size {size}")]
    IndexOutOfBounds {
        /// The index that was requested
        index: usize,
        /// The size of the container at the time of the request
        size: usize,
    },
}

/// Errors related to reusable pools.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool is empty and has no factory to construct a new instance
    #[error("Pool is empty and has no factory")]
    NoFactory,
}

/// Errors related to pending-use counted objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The object is idle in its pool and must not be used
    #[error("Object already released to its pool")]
    Released,

    /// A decrement would take the pending-use counter below zero
    #[error("Cannot release {requested} uses, only {current} pending")]
    Overreleased {
        /// Pending uses at the time of the call
        current: u32,
        /// Uses the caller tried to release
        requested: u32,
    },

    /// The object has no pending use and cannot be written
    #[error("Object has no pending uses")]
    Inactive,

    /// The pending-use counter would overflow
    #[error("Pending-use counter overflow")]
    Overflow,

    /// The counter reached zero while a payload guard was still held, so the
    /// object was dropped instead of pooled
    #[error("Payload still borrowed at release; object not returned to its pool")]
    PayloadBorrowed,
}

/// Errors related to task executors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The operation is part of the executor contract but is not provided
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// The worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Errors related to configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds invalid values
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type used throughout the hotpath toolkit.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let error: Error = PoolError::NoFactory.into();
        assert!(matches!(error, Error::Pool(PoolError::NoFactory)));

        let error: Error = LifecycleError::Released.into();
        assert!(matches!(error, Error::Lifecycle(LifecycleError::Released)));

        let error: Error = ExecutorError::NotImplemented("submit").into();
        assert!(matches!(error, Error::Executor(_)));
    }

    #[test]
    fn test_error_display() {
        let error: Error = ContainerError::IndexOutOfBounds { index: 7, size: 3 }.into();
        let display = format!("{}", error);
        assert!(display.contains("Index 7 out of bounds for size 3"));

        let error = LifecycleError::Overreleased {
            current: 1,
            requested: 2,
        };
        assert_eq!(error.to_string(), "Cannot release 2 uses, only 1 pending");
    }
}
