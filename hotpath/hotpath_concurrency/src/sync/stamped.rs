//! Stamped lock with optimistic reads.
//!
//! The whole lock lives in one `u64` state word:
//!
//! - bits 0..7: number of read holders
//! - bit 7: writer bit
//! - bits 8..: version, advanced every time a writer releases
//!
//! Write stamps are the state with the writer bit set. Optimistic stamps are
//! the state with the reader bits masked off, and validate as long as no
//! writer has acquired the lock since they were taken.

use std::hint;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::thread;

use hotpath_core::utils::LockKind;

use super::strategy::{LockStrategy, Stamp};

const LG_READERS: u32 = 7;
const RUNIT: u64 = 1;
const WBIT: u64 = 1 << LG_READERS;
const RBITS: u64 = WBIT - 1;
const RFULL: u64 = RBITS - 1;
const ABITS: u64 = RBITS | WBIT;
const SBITS: u64 = !RBITS;

/// Initial state. Keeps every issued stamp nonzero.
const ORIGIN: u64 = WBIT << 1;

const SPINS_BEFORE_YIELD: u32 = 64;

/// A read/write lock whose readers can skip locking altogether.
///
/// ```
/// use hotpath_concurrency::sync::{LockStrategy, StampedLock};
///
/// let lock = StampedLock::new();
/// let stamp = lock.try_optimistic_read();
/// // ... read shared state ...
/// assert!(lock.validate(stamp));
/// ```
///
/// Neither side is reentrant.
#[derive(Debug)]
pub struct StampedLock {
    state: AtomicU64,
}

impl Default for StampedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl StampedLock {
    /// Create an unlocked lock.
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(ORIGIN),
        }
    }

    /// Whether a writer currently holds the lock.
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WBIT != 0
    }

    /// Number of read holders.
    pub fn read_count(&self) -> u64 {
        self.state.load(Ordering::Relaxed) & RBITS
    }

    /// Acquire a read lock if no writer holds the lock.
    pub fn try_read_lock(&self) -> Option<Stamp> {
        loop {
            let s = self.state.load(Ordering::Relaxed);
            if s & WBIT != 0 {
                return None;
            }
            if s & RBITS < RFULL {
                if self
                    .state
                    .compare_exchange_weak(s, s + RUNIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return Some(s + RUNIT);
                }
            } else {
                // Reader count saturated; wait for one to leave.
                hint::spin_loop();
            }
        }
    }
}

struct Backoff {
    step: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { step: 0 }
    }

    fn snooze(&mut self) {
        if self.step < SPINS_BEFORE_YIELD {
            hint::spin_loop();
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}

impl LockStrategy for StampedLock {
    fn read_lock(&self) -> Stamp {
        let mut backoff = Backoff::new();
        loop {
            let s = self.state.load(Ordering::Relaxed);
            if s & WBIT == 0
                && s & RBITS < RFULL
                && self
                    .state
                    .compare_exchange_weak(s, s + RUNIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return s + RUNIT;
            }
            backoff.snooze();
        }
    }

    fn read_unlock(&self, stamp: Stamp) {
        loop {
            let s = self.state.load(Ordering::Relaxed);
            if (s & SBITS) != (stamp & SBITS) || s & RBITS == 0 || stamp & RBITS == 0 {
                panic!("StampedLock read lock released with a stamp it did not issue");
            }
            if self
                .state
                .compare_exchange_weak(s, s - RUNIT, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn write_lock(&self) -> Stamp {
        let mut backoff = Backoff::new();
        loop {
            let s = self.state.load(Ordering::Relaxed);
            if s & ABITS == 0
                && self
                    .state
                    .compare_exchange_weak(s, s + WBIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                // Publish the writer bit before any guarded store.
                fence(Ordering::Release);
                return s + WBIT;
            }
            backoff.snooze();
        }
    }

    fn write_unlock(&self, stamp: Stamp) {
        let s = self.state.load(Ordering::Relaxed);
        if s != stamp || stamp & WBIT == 0 {
            panic!("StampedLock write lock released with a stamp it did not issue");
        }

        // Clearing the writer bit carries into the version.
        let next = match s.wrapping_add(WBIT) {
            0 => ORIGIN,
            next => next,
        };
        self.state.store(next, Ordering::Release);
    }

    fn try_write_lock(&self) -> Option<Stamp> {
        let s = self.state.load(Ordering::Relaxed);
        if s & ABITS != 0 {
            return None;
        }
        self.state
            .compare_exchange(s, s + WBIT, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| {
                fence(Ordering::Release);
                s + WBIT
            })
    }

    fn try_optimistic_read(&self) -> Stamp {
        let s = self.state.load(Ordering::Acquire);
        if s & WBIT == 0 {
            s & SBITS
        } else {
            0
        }
    }

    fn validate(&self, stamp: Stamp) -> bool {
        fence(Ordering::Acquire);
        stamp != 0 && (stamp & SBITS) == (self.state.load(Ordering::Relaxed) & SBITS)
    }

    fn kind(&self) -> LockKind {
        LockKind::Stamped
    }
}
