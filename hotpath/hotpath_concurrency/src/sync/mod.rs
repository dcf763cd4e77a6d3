//! Lock strategies and lock-guarded values.
//!
//! - `strategy`: the `LockStrategy` contract and the runtime-selected `AnyLock`
//! - `spin`: exclusive CAS spin lock
//! - `reentrant`: reentrant read/write lock
//! - `stamped`: stamped lock with optimistic reads
//! - `guarded`: values reachable only through RAII lock guards

pub mod guarded;
pub mod reentrant;
pub mod spin;
pub mod stamped;
pub mod strategy;

pub use guarded::{Exclusive, Guarded, ReadGuard, WriteGuard};
pub use reentrant::ReentrantRwLock;
pub use spin::SpinLock;
pub use stamped::StampedLock;
pub use strategy::{AnyLock, LockStrategy, Stamp};
