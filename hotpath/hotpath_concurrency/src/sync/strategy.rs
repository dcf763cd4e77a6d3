//! The pluggable lock contract.
//!
//! Containers in this crate are generic over a `LockStrategy`, so the same
//! array or dictionary can be guarded by a spin lock, a reentrant
//! read/write lock or a stamped lock depending on how it is used. The
//! strategy is fixed when the container is built.
//!
//! Every acquisition returns a `Stamp` that must be handed back to the
//! matching release. Strategies without stamp validation always return 0.

use std::time::Duration;

use hotpath_core::error::LockError;
use hotpath_core::utils::LockKind;

use super::reentrant::ReentrantRwLock;
use super::spin::SpinLock;
use super::stamped::StampedLock;

/// Opaque token returned by lock and optimistic-read operations.
pub type Stamp = u64;

/// A mutual-exclusion policy with a uniform acquire/release contract.
///
/// Releasing a lock that is not held, or with a stamp that did not come from
/// the matching acquisition, is a programming error and panics.
pub trait LockStrategy: Send + Sync {
    /// Acquire shared access, blocking until it is available.
    fn read_lock(&self) -> Stamp;

    /// Release shared access taken with `read_lock`.
    fn read_unlock(&self, stamp: Stamp);

    /// Acquire exclusive access, blocking until it is available.
    fn write_lock(&self) -> Stamp;

    /// Release exclusive access taken with `write_lock`.
    fn write_unlock(&self, stamp: Stamp);

    /// Acquire exclusive access only if it is immediately available.
    fn try_write_lock(&self) -> Option<Stamp>;

    /// Timed acquisition. No strategy in this crate supports it.
    fn try_write_lock_for(&self, _timeout: Duration) -> Result<Stamp, LockError> {
        Err(LockError::Unsupported("timed lock acquisition"))
    }

    /// Take an optimistic read stamp.
    ///
    /// Returns 0 when the strategy has no optimistic mode or a writer is
    /// currently active. A nonzero stamp must be passed to `validate` after
    /// reading; values read under it are only trustworthy if it validates.
    fn try_optimistic_read(&self) -> Stamp {
        0
    }

    /// Check that no write happened since `stamp` was issued.
    fn validate(&self, _stamp: Stamp) -> bool {
        false
    }

    /// Which strategy this is.
    fn kind(&self) -> LockKind;
}

/// A lock strategy chosen at runtime from a `LockKind`.
///
/// Lets configuration decide the strategy without making every container
/// type generic at the call site.
#[derive(Debug)]
pub enum AnyLock {
    /// Exclusive spin lock
    Spin(SpinLock),

    /// Reentrant read/write lock
    ReentrantRw(ReentrantRwLock),

    /// Stamped lock with optimistic reads
    Stamped(StampedLock),
}

impl AnyLock {
    /// Build the strategy named by `kind`.
    pub fn new(kind: LockKind) -> Self {
        match kind {
            LockKind::Spin => Self::Spin(SpinLock::new()),
            LockKind::ReentrantRw => Self::ReentrantRw(ReentrantRwLock::new()),
            LockKind::Stamped => Self::Stamped(StampedLock::new()),
        }
    }
}

impl Default for AnyLock {
    fn default() -> Self {
        Self::new(LockKind::default())
    }
}

impl From<LockKind> for AnyLock {
    fn from(kind: LockKind) -> Self {
        Self::new(kind)
    }
}

macro_rules! dispatch {
    ($self:ident, $lock:ident => $body:expr) => {
        match $self {
            AnyLock::Spin($lock) => $body,
            AnyLock::ReentrantRw($lock) => $body,
            AnyLock::Stamped($lock) => $body,
        }
    };
}

impl LockStrategy for AnyLock {
    fn read_lock(&self) -> Stamp {
        dispatch!(self, lock => lock.read_lock())
    }

    fn read_unlock(&self, stamp: Stamp) {
        dispatch!(self, lock => lock.read_unlock(stamp))
    }

    fn write_lock(&self) -> Stamp {
        dispatch!(self, lock => lock.write_lock())
    }

    fn write_unlock(&self, stamp: Stamp) {
        dispatch!(self, lock => lock.write_unlock(stamp))
    }

    fn try_write_lock(&self) -> Option<Stamp> {
        dispatch!(self, lock => lock.try_write_lock())
    }

    fn try_optimistic_read(&self) -> Stamp {
        dispatch!(self, lock => lock.try_optimistic_read())
    }

    fn validate(&self, stamp: Stamp) -> bool {
        dispatch!(self, lock => lock.validate(stamp))
    }

    fn kind(&self) -> LockKind {
        dispatch!(self, lock => lock.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_lock_kind() {
        assert_eq!(AnyLock::new(LockKind::Spin).kind(), LockKind::Spin);
        assert_eq!(AnyLock::new(LockKind::Stamped).kind(), LockKind::Stamped);
        assert_eq!(AnyLock::default().kind(), LockKind::ReentrantRw);
    }

    #[test]
    fn test_timed_acquisition_unsupported() {
        for kind in [LockKind::Spin, LockKind::ReentrantRw, LockKind::Stamped] {
            let lock = AnyLock::new(kind);
            let result = lock.try_write_lock_for(Duration::from_millis(1));
            assert_eq!(
                result,
                Err(LockError::Unsupported("timed lock acquisition"))
            );
        }
    }

    #[test]
    fn test_optimistic_read_only_on_stamped() {
        let spin = AnyLock::new(LockKind::Spin);
        assert_eq!(spin.try_optimistic_read(), 0);
        assert!(!spin.validate(0));

        let stamped = AnyLock::new(LockKind::Stamped);
        let stamp = stamped.try_optimistic_read();
        assert_ne!(stamp, 0);
        assert!(stamped.validate(stamp));

        let write = stamped.write_lock();
        assert!(!stamped.validate(stamp));
        stamped.write_unlock(write);
        assert!(!stamped.validate(stamp));
    }
}
