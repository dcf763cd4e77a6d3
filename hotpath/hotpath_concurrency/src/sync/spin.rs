//! Exclusive CAS spin lock.

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};

use hotpath_core::utils::LockKind;

use super::strategy::{LockStrategy, Stamp};

/// An exclusive lock that busy-waits on a single CAS flag.
///
/// Waiters never yield to the OS scheduler; they burn a few cycles on a
/// throwaway computation between attempts. That keeps hand-off latency low
/// for very short critical sections and wastes CPU for long ones, so only
/// use it where the lock is held for a handful of instructions.
///
/// The lock is not reentrant: acquiring it again from the thread that holds
/// it deadlocks. Reads and writes both take the same exclusive flag.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Create an unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the lock is acquired.
    pub fn acquire(&self) {
        let mut sink = 1u32;

        while !self.try_acquire() {
            // Test before retrying the CAS so waiters spin on a shared line.
            while self.locked.load(Ordering::Relaxed) {
                sink = consume_cpu(sink);
            }
        }

        black_box(sink);
    }

    /// Acquire the lock if it is free.
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held.
    pub fn release(&self) {
        if !self.locked.swap(false, Ordering::Release) {
            panic!("SpinLock released while not held");
        }
    }

    /// Whether some thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Cheap arithmetic that the optimizer cannot remove.
#[inline]
fn consume_cpu(value: u32) -> u32 {
    let shift = value & 31;
    let mut next = value.wrapping_mul(value);
    next = next.wrapping_add(value >> 1);
    next = next.wrapping_add(value & next);
    next = next.wrapping_add(value ^ next);
    next = next.wrapping_add(next << shift);
    next = next.wrapping_add(next | value);
    black_box(next)
}

impl LockStrategy for SpinLock {
    fn read_lock(&self) -> Stamp {
        self.acquire();
        0
    }

    fn read_unlock(&self, _stamp: Stamp) {
        self.release();
    }

    fn write_lock(&self) -> Stamp {
        self.acquire();
        0
    }

    fn write_unlock(&self, _stamp: Stamp) {
        self.release();
    }

    fn try_write_lock(&self) -> Option<Stamp> {
        // A weak CAS may fail spuriously, which a one-shot try must not report.
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| 0)
    }

    fn kind(&self) -> LockKind {
        LockKind::Spin
    }
}
