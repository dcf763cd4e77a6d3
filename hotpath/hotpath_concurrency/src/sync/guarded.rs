//! A value protected by a pluggable lock strategy.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use super::reentrant::ReentrantRwLock;
use super::strategy::{LockStrategy, Stamp};

/// A value that can only be reached through the guards of its lock.
///
/// `read()` and `write()` return RAII guards that hold the lock's stamp and
/// release it when dropped, so a batch of operations is bracketed by one
/// acquisition and the lock is released on every exit path, unwinding
/// included.
///
/// Reentrant strategies let the writing thread acquire the lock again.
/// Handing out a second guard in that case would alias the exclusive borrow,
/// so `read()` or `write()` called while the same thread holds a write guard
/// panics instead.
pub struct Guarded<T, L = ReentrantRwLock> {
    lock: L,
    writer_active: AtomicBool,
    value: UnsafeCell<T>,
}

// The lock serializes every access to `value`.
unsafe impl<T: Send, L: Send> Send for Guarded<T, L> {}
unsafe impl<T: Send + Sync, L: Sync> Sync for Guarded<T, L> {}

impl<T, L: LockStrategy + Default> Guarded<T, L> {
    /// Wrap `value` with a default-constructed lock.
    pub fn new(value: T) -> Self {
        Self::with_lock(value, L::default())
    }
}

impl<T: Default, L: LockStrategy + Default> Default for Guarded<T, L> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, L: LockStrategy> Guarded<T, L> {
    /// Wrap `value` with the given lock.
    pub fn with_lock(value: T, lock: L) -> Self {
        Self {
            lock,
            writer_active: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire shared access.
    pub fn read(&self) -> ReadGuard<'_, T, L> {
        let stamp = self.lock.read_lock();
        if self.writer_active.load(Ordering::Acquire) {
            self.lock.read_unlock(stamp);
            panic!("Guarded value read while the same thread holds its write guard");
        }

        ReadGuard {
            owner: self,
            stamp,
            _not_send: PhantomData,
        }
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> WriteGuard<'_, T, L> {
        let stamp = self.lock.write_lock();
        self.enter_write(stamp)
    }

    /// Acquire exclusive access if the lock is immediately available.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T, L>> {
        self.lock
            .try_write_lock()
            .map(|stamp| self.enter_write(stamp))
    }

    fn enter_write(&self, stamp: Stamp) -> WriteGuard<'_, T, L> {
        if self.writer_active.swap(true, Ordering::Acquire) {
            self.lock.write_unlock(stamp);
            panic!("Guarded value written while the same thread holds its write guard");
        }

        WriteGuard {
            owner: self,
            stamp,
            _not_send: PhantomData,
        }
    }

    /// Mutable access without locking; the borrow checker proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// The lock strategy guarding this value.
    pub fn lock(&self) -> &L {
        &self.lock
    }

    /// Consume the wrapper and return the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: fmt::Debug, L: LockStrategy + fmt::Debug> fmt::Debug for Guarded<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Guarded");
        debug.field("lock", &self.lock);

        // Never blocks, and never trips the nested-guard panic.
        let guard = if self.writer_active.load(Ordering::Acquire) {
            None
        } else {
            self.try_write()
        };
        match &guard {
            Some(value) => debug.field("value", &**value),
            None => debug.field("value", &format_args!("<locked>")),
        };

        debug.finish()
    }
}

/// A value reachable only through exclusive guards.
///
/// Like `Guarded`, but without shared read guards, so `T` only has to be
/// `Send` for the wrapper to be shared between threads.
pub struct Exclusive<T, L = ReentrantRwLock> {
    inner: Guarded<T, L>,
}

// No `&T` is ever handed to two threads at once: the only access path is a
// write guard, which is exclusive and cannot leave the acquiring thread.
unsafe impl<T: Send, L: Sync> Sync for Exclusive<T, L> {}

impl<T, L: LockStrategy + Default> Exclusive<T, L> {
    /// Wrap `value` with a default-constructed lock.
    pub fn new(value: T) -> Self {
        Self::with_lock(value, L::default())
    }
}

impl<T, L: LockStrategy> Exclusive<T, L> {
    /// Wrap `value` with the given lock.
    pub fn with_lock(value: T, lock: L) -> Self {
        Self {
            inner: Guarded::with_lock(value, lock),
        }
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> WriteGuard<'_, T, L> {
        self.inner.write()
    }

    /// Acquire exclusive access if the lock is immediately available.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T, L>> {
        self.inner.try_write()
    }

    /// Mutable access without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the wrapper and return the value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T, L> fmt::Debug for Exclusive<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusive").finish_non_exhaustive()
    }
}

/// Shared access to a `Guarded` value.
pub struct ReadGuard<'a, T, L: LockStrategy> {
    owner: &'a Guarded<T, L>,
    stamp: Stamp,
    _not_send: PhantomData<*const ()>,
}

impl<T, L: LockStrategy> ReadGuard<'_, T, L> {
    /// Stamp returned by the read acquisition.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }
}

impl<T, L: LockStrategy> Deref for ReadGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // Held read lock, and no write guard is live.
        unsafe { &*self.owner.value.get() }
    }
}

impl<T, L: LockStrategy> Drop for ReadGuard<'_, T, L> {
    fn drop(&mut self) {
        self.owner.lock.read_unlock(self.stamp);
    }
}

/// Exclusive access to a `Guarded` value.
pub struct WriteGuard<'a, T, L: LockStrategy> {
    owner: &'a Guarded<T, L>,
    stamp: Stamp,
    _not_send: PhantomData<*const ()>,
}

impl<T, L: LockStrategy> WriteGuard<'_, T, L> {
    /// Stamp returned by the write acquisition.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }
}

impl<T, L: LockStrategy> Deref for WriteGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.owner.value.get() }
    }
}

impl<T, L: LockStrategy> DerefMut for WriteGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        // Held write lock, and this is the only live guard.
        unsafe { &mut *self.owner.value.get() }
    }
}

impl<T, L: LockStrategy> Drop for WriteGuard<'_, T, L> {
    fn drop(&mut self) {
        self.owner.writer_active.store(false, Ordering::Release);
        self.owner.lock.write_unlock(self.stamp);
    }
}
