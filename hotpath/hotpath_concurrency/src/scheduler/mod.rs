//! Task scheduling.
//!
//! - `executor`: a single worker thread draining a batched wait list
//! - `thread_factory`: how executors obtain their worker threads

pub mod executor;
pub mod thread_factory;

pub use executor::{ExecutorStats, SingleThreadExecutor, Task};
pub use thread_factory::{GroupThreadFactory, ThreadBody, ThreadFactory};
