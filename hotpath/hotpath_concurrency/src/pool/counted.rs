//! Pool-backed objects with a pending-use counter.
//!
//! A `Counted` object is borrowed from its `CountedPool`, its counter is
//! raised once per outstanding operation (for example, once per channel a
//! packet is queued on), and each finished operation calls `complete`. The
//! call that takes the counter to zero returns the object to the pool.
//!
//! The counter and the "idle in pool" state share one atomic word. The
//! transition to zero moves the word straight to the idle sentinel, so every
//! later decrement, force-complete or increment fails instead of returning
//! the object a second time.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use hotpath_core::error::LifecycleError;
use hotpath_core::traits::Reusable;
use log::{debug, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::reusable::{PoolStats, ReusablePool};

/// State word value of an object sitting idle in its pool.
const IDLE: u32 = u32::MAX;

/// Outcome of a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Uses are still outstanding
    Pending(u32),

    /// The counter reached zero and the object went back to its pool
    Released,
}

/// An object whose return to the pool is gated on a pending-use counter.
pub struct Counted<P> {
    state: AtomicU32,
    pool: Weak<CountedPool<P>>,
    payload: RwLock<P>,
}

impl<P: Reusable + Send + Sync + 'static> Counted<P> {
    /// Add `uses` pending uses.
    ///
    /// Fails with `Released` if the object is idle in its pool.
    pub fn increase_uses(&self, uses: u32) -> Result<u32, LifecycleError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == IDLE {
                warn!("Tried to use an object that was already released to its pool");
                return Err(LifecycleError::Released);
            }

            let next = match current.checked_add(uses) {
                Some(next) if next != IDLE => next,
                _ => return Err(LifecycleError::Overflow),
            };

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Release `uses` pending uses. The caller that takes the counter to zero
    /// returns the object to its pool.
    ///
    /// # Errors
    ///
    /// Reaching zero while any `payload()` or `payload_mut()` guard is alive
    /// returns `PayloadBorrowed`. The object is then idle but not pooled, and
    /// is freed once the last `Arc` to it drops.
    pub fn decrease_uses(self: &Arc<Self>, uses: u32) -> Result<Completion, LifecycleError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == IDLE {
                warn!("Tried to complete an object that was already released to its pool");
                return Err(LifecycleError::Released);
            }
            if uses == 0 {
                return Ok(Completion::Pending(current));
            }
            if current < uses {
                warn!(
                    "Tried to release {} uses of an object with {} pending",
                    uses, current
                );
                return Err(LifecycleError::Overreleased {
                    current,
                    requested: uses,
                });
            }

            let remaining = current - uses;
            let next = if remaining == 0 { IDLE } else { remaining };

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if remaining == 0 => {
                    self.release_to_pool()?;
                    return Ok(Completion::Released);
                }
                Ok(_) => return Ok(Completion::Pending(remaining)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Release one pending use.
    ///
    /// Drop payload guards first; see `decrease_uses`.
    pub fn complete(self: &Arc<Self>) -> Result<Completion, LifecycleError> {
        self.decrease_uses(1)
    }

    /// Return the object to its pool regardless of pending uses.
    ///
    /// Calling this on an object that is already idle is detected and leaves
    /// the pool untouched. Fails with `PayloadBorrowed` like `decrease_uses`.
    pub fn force_complete(self: &Arc<Self>) -> Result<(), LifecycleError> {
        if self.state.swap(IDLE, Ordering::AcqRel) == IDLE {
            warn!("Tried to force-complete an object that was already released to its pool");
            return Err(LifecycleError::Released);
        }

        self.release_to_pool()
    }

    /// Fail unless at least one use is pending. Returns the pending count.
    pub fn check_active(&self) -> Result<u32, LifecycleError> {
        match self.state.load(Ordering::Acquire) {
            IDLE => Err(LifecycleError::Released),
            0 => Err(LifecycleError::Inactive),
            pending => Ok(pending),
        }
    }

    fn release_to_pool(self: &Arc<Self>) -> Result<(), LifecycleError> {
        // Clearing the payload takes its write lock, which a guard held by
        // this thread would block forever.
        if self.payload.try_write().is_none() {
            warn!("Payload still borrowed when its last use completed, dropping object");
            return Err(LifecycleError::PayloadBorrowed);
        }

        match self.pool.upgrade() {
            Some(pool) => pool.idle.put(PoolSlot(Arc::clone(self))),
            None => debug!("Owning pool is gone, dropping released object"),
        }
        Ok(())
    }
}

impl<P> Counted<P> {
    /// Pending uses. Zero while idle or freshly taken.
    pub fn pending_uses(&self) -> u32 {
        match self.state.load(Ordering::Acquire) {
            IDLE => 0,
            pending => pending,
        }
    }

    /// Whether the object is idle in its pool.
    pub fn is_idle(&self) -> bool {
        self.state.load(Ordering::Acquire) == IDLE
    }

    /// Shared access to the payload.
    ///
    /// Release the guard before the `complete` that could return the object
    /// to its pool, or that call fails with `PayloadBorrowed`.
    pub fn payload(&self) -> RwLockReadGuard<'_, P> {
        self.payload.read()
    }

    /// Exclusive access to the payload. Same release rule as `payload`.
    pub fn payload_mut(&self) -> RwLockWriteGuard<'_, P> {
        self.payload.write()
    }
}

impl<P: fmt::Debug> fmt::Debug for Counted<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("pending_uses", &self.pending_uses())
            .field("idle", &self.is_idle())
            .field("payload", &*self.payload.read())
            .finish()
    }
}

/// Idle-set entry. Runs the payload hooks and moves the state word.
struct PoolSlot<P>(Arc<Counted<P>>);

impl<P: Reusable> Reusable for PoolSlot<P> {
    fn reuse(&mut self) {
        self.0.payload.write().reuse();
        self.0.state.store(0, Ordering::Release);
    }

    fn free(&mut self) {
        self.0.payload.write().free();
        self.0.state.store(IDLE, Ordering::Release);
    }
}

/// Pool of `Counted` objects.
pub struct CountedPool<P> {
    idle: ReusablePool<PoolSlot<P>>,
    factory: Box<dyn Fn() -> P + Send + Sync>,
    this: Weak<CountedPool<P>>,
}

impl<P: Reusable + Send + Sync + 'static> CountedPool<P> {
    /// Create a pool that constructs payloads with `factory`.
    pub fn new(factory: impl Fn() -> P + Send + Sync + 'static) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            idle: ReusablePool::new(),
            factory: Box::new(factory),
            this: this.clone(),
        })
    }

    /// Create a pool that keeps at most `max_idle` idle objects.
    pub fn with_max_idle(
        factory: impl Fn() -> P + Send + Sync + 'static,
        max_idle: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            idle: ReusablePool::new().with_max_idle(max_idle),
            factory: Box::new(factory),
            this: this.clone(),
        })
    }

    /// Borrow an object with no pending uses.
    ///
    /// Call `increase_uses` before handing it to whatever will `complete` it.
    pub fn acquire(&self) -> Arc<Counted<P>> {
        let slot = self.idle.take_or_else(|| {
            PoolSlot(Arc::new(Counted {
                state: AtomicU32::new(0),
                pool: self.this.clone(),
                payload: RwLock::new((self.factory)()),
            }))
        });
        slot.0
    }

    /// Borrow an object with `uses` pending uses already recorded.
    pub fn acquire_with_uses(&self, uses: u32) -> Result<Arc<Counted<P>>, LifecycleError> {
        let object = self.acquire();
        if uses > 0 {
            object.increase_uses(uses)?;
        }
        Ok(object)
    }

    /// Number of idle objects.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Snapshot of the underlying pool's counters.
    pub fn stats(&self) -> PoolStats {
        self.idle.stats()
    }
}

impl<P> fmt::Debug for CountedPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountedPool")
            .field("idle", &self.idle)
            .finish()
    }
}
