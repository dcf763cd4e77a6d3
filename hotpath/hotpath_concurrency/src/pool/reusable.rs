//! Pool of idle `Reusable` instances.
//!
//! Hot-path code borrows an instance with `take`, uses it, and hands it back
//! with `put` instead of allocating a fresh one each time.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use hotpath_core::error::PoolError;
use hotpath_core::traits::Reusable;
use hotpath_core::utils::PoolConfig;
use log::{debug, trace};

use crate::sync::{AnyLock, Guarded, LockStrategy, ReentrantRwLock};

/// Constructs a new instance when the pool is empty.
pub type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Statistics about a reusable pool
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances constructed by the pool
    pub total_created: usize,

    /// Successful take operations
    pub total_taken: usize,

    /// Put operations that kept the instance
    pub total_returned: usize,

    /// Idle instances removed explicitly
    pub total_evicted: usize,

    /// Put operations that dropped the instance because the pool was full
    pub total_discarded: usize,
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    taken: AtomicUsize,
    returned: AtomicUsize,
    evicted: AtomicUsize,
    discarded: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// A set of idle instances guarded by a lock strategy.
///
/// `take` and `put` are each atomic with respect to the idle set, but two
/// pools used together do not compose into one transaction. Reuse order is
/// LIFO in practice and not part of the contract.
///
/// The pool cannot tell whether an instance handed to `put` is still in use
/// somewhere else; returning it twice puts two handles to it in circulation.
pub struct ReusablePool<T, L = ReentrantRwLock> {
    idle: Guarded<Vec<T>, L>,
    factory: Option<Factory<T>>,
    max_idle: Option<usize>,
    available: AtomicUsize,
    counters: Counters,
}

impl<T: Reusable, L: LockStrategy + Default> ReusablePool<T, L> {
    /// Create an empty pool with no factory.
    pub fn new() -> Self {
        Self::with_lock(L::default(), None)
    }

    /// Create an empty pool that constructs instances with `factory`.
    pub fn with_factory(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_lock(L::default(), Some(Box::new(factory)))
    }
}

impl<T: Reusable, L: LockStrategy + Default> Default for ReusablePool<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reusable> ReusablePool<T, AnyLock> {
    /// Create a pool as described by `config`, constructing
    /// `config.initial_size` instances up front when a factory is given.
    pub fn from_config(
        config: &PoolConfig,
        factory: Option<Factory<T>>,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::with_lock(AnyLock::new(config.lock), factory);
        pool.max_idle = config.max_idle;
        if config.initial_size > 0 {
            pool.prefill(config.initial_size)?;
        }
        Ok(pool)
    }
}

impl<T: Reusable, L: LockStrategy> ReusablePool<T, L> {
    /// Create an empty pool guarded by `lock`.
    pub fn with_lock(lock: L, factory: Option<Factory<T>>) -> Self {
        Self {
            idle: Guarded::with_lock(Vec::new(), lock),
            factory,
            max_idle: None,
            available: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    /// Keep at most `max_idle` idle instances.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Take an idle instance, reset for its new borrower.
    pub fn take(&self) -> Option<T> {
        if self.available.load(Ordering::Acquire) == 0 {
            return None;
        }

        let popped = {
            let mut idle = self.idle.write();
            let popped = idle.pop();
            self.available.store(idle.len(), Ordering::Release);
            popped
        };

        popped.map(|mut instance| {
            instance.reuse();
            Counters::bump(&self.counters.taken, 1);
            instance
        })
    }

    /// Take an idle instance or construct one with the pool's factory.
    pub fn take_or_create(&self) -> Result<T, PoolError> {
        if let Some(instance) = self.take() {
            return Ok(instance);
        }

        let factory = self.factory.as_ref().ok_or(PoolError::NoFactory)?;
        Ok(self.created(factory()))
    }

    /// Take an idle instance or construct one with `create`.
    pub fn take_or_else(&self, create: impl FnOnce() -> T) -> T {
        match self.take() {
            Some(instance) => instance,
            None => self.created(create()),
        }
    }

    fn created(&self, instance: T) -> T {
        Counters::bump(&self.counters.created, 1);
        Counters::bump(&self.counters.taken, 1);
        trace!("Pool was empty, constructed a new instance");
        instance
    }

    /// Clear `instance` for storage and add it to the idle set.
    ///
    /// If the pool already holds `max_idle` instances, the instance is
    /// dropped instead.
    pub fn put(&self, mut instance: T) {
        instance.free();

        let rejected = {
            let mut idle = self.idle.write();
            if self.max_idle.is_some_and(|max| idle.len() >= max) {
                Some(instance)
            } else {
                idle.push(instance);
                self.available.store(idle.len(), Ordering::Release);
                None
            }
        };

        match rejected {
            Some(instance) => {
                Counters::bump(&self.counters.discarded, 1);
                drop(instance);
            }
            None => Counters::bump(&self.counters.returned, 1),
        }
    }

    /// Evict one idle instance equal to `instance`. Returns whether one was
    /// found.
    pub fn remove(&self, instance: &T) -> bool
    where
        T: PartialEq,
    {
        let removed = {
            let mut idle = self.idle.write();
            let position = idle.iter().position(|candidate| candidate == instance);
            let removed = position.map(|index| idle.swap_remove(index));
            self.available.store(idle.len(), Ordering::Release);
            removed
        };

        match removed {
            Some(_) => {
                Counters::bump(&self.counters.evicted, 1);
                true
            }
            None => false,
        }
    }

    /// Evict every idle instance matching `predicate`. Returns how many were
    /// evicted.
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let evicted: Vec<T> = {
            let mut idle = self.idle.write();
            let mut evicted = Vec::new();
            let mut index = 0;
            while index < idle.len() {
                if predicate(&idle[index]) {
                    evicted.push(idle.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            self.available.store(idle.len(), Ordering::Release);
            evicted
        };

        Counters::bump(&self.counters.evicted, evicted.len());
        evicted.len()
    }

    /// Evict every idle instance.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    /// Construct up to `count` instances with the factory and add them to the
    /// idle set, stopping at `max_idle`. Returns how many were added.
    pub fn prefill(&self, count: usize) -> Result<usize, PoolError> {
        let factory = self.factory.as_ref().ok_or(PoolError::NoFactory)?;

        let mut idle = self.idle.write();
        let room = match self.max_idle {
            Some(max) => max.saturating_sub(idle.len()).min(count),
            None => count,
        };

        idle.reserve(room);
        for _ in 0..room {
            idle.push(factory());
        }
        self.available.store(idle.len(), Ordering::Release);
        drop(idle);

        Counters::bump(&self.counters.created, room);
        debug!("Prefilled pool with {} instances", room);
        Ok(room)
    }

    /// Number of idle instances, read without locking.
    pub fn len(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// Whether there are no idle instances.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound on idle instances, if any.
    pub fn max_idle(&self) -> Option<usize> {
        self.max_idle
    }

    /// Whether the pool can construct instances on its own.
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        PoolStats {
            total_created: load(&self.counters.created),
            total_taken: load(&self.counters.taken),
            total_returned: load(&self.counters.returned),
            total_evicted: load(&self.counters.evicted),
            total_discarded: load(&self.counters.discarded),
        }
    }
}

impl<T, L> fmt::Debug for ReusablePool<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReusablePool")
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("max_idle", &self.max_idle)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
