//! # Hotpath Concurrency
//!
//! Lock-strategy-generic containers, object pools and a batching executor
//! for latency-sensitive servers that want to avoid allocating on the hot
//! path.
//!
//! Key concepts:
//!
//! 1. **Lock strategies**: spin, reentrant read/write and stamped locks behind
//!    one `LockStrategy` contract, chosen when a container is built.
//!
//! 2. **Containers**: a growable array with optimistic reads and a chained
//!    hash dictionary whose entries are pooled.
//!
//! 3. **Pools**: `ReusablePool` keeps idle instances for reuse, and
//!    `CountedPool` returns objects once their pending uses reach zero.
//!
//! 4. **Executor**: one worker thread that claims submitted tasks in batches
//!    and parks when idle.

pub mod cleanup;
pub mod collections;
pub mod packet;
pub mod pool;
pub mod scheduler;
pub mod sync;

pub use cleanup::{CleanupError, CleanupOutcome, CleanupRegistry, CleanupReport};
pub use collections::{
    ArrayReadGuard, ArrayView, ArrayWriteGuard, ConcurrentArray, ConcurrentDictionary, Dictionary,
    DictionaryKey, OptimisticRead,
};
pub use packet::SendablePacket;
pub use pool::{Completion, Counted, CountedPool, Factory, PoolStats, ReusablePool};
pub use scheduler::{
    ExecutorStats, GroupThreadFactory, SingleThreadExecutor, Task, ThreadBody, ThreadFactory,
};
pub use sync::{
    AnyLock, Exclusive, Guarded, LockStrategy, ReadGuard, ReentrantRwLock, SpinLock, Stamp,
    StampedLock, WriteGuard,
};

pub use hotpath_core::Reusable;
