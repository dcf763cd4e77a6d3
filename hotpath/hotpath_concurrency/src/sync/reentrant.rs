//! Reentrant read/write lock.

use std::thread::{self, ThreadId};

use hotpath_core::utils::LockKind;
use parking_lot::{Condvar, Mutex};

use super::strategy::{LockStrategy, Stamp};

#[derive(Debug, Default)]
struct RwState {
    /// Read holds across all threads, including the writer's own
    readers: usize,

    /// Thread currently holding the write lock
    writer: Option<ThreadId>,

    /// Nested write acquisitions by `writer`
    write_holds: usize,
}

/// A read/write lock that is reentrant on both sides.
///
/// Many threads may hold read locks at once. One thread may hold the write
/// lock, acquire it again any number of times, and also take read locks while
/// writing. Writers are not preferred over readers, so a steady stream of
/// readers can delay a writer indefinitely.
///
/// Upgrading is not supported: a thread that holds only a read lock and asks
/// for the write lock waits for itself forever.
#[derive(Debug, Default)]
pub struct ReentrantRwLock {
    state: Mutex<RwState>,
    released: Condvar,
}

impl ReentrantRwLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any thread holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    /// Whether the calling thread holds the write lock.
    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.state.lock().writer == Some(thread::current().id())
    }

    /// Number of read holds currently outstanding.
    pub fn read_count(&self) -> usize {
        self.state.lock().readers
    }
}

impl LockStrategy for ReentrantRwLock {
    fn read_lock(&self) -> Stamp {
        let me = thread::current().id();
        let mut state = self.state.lock();

        while matches!(state.writer, Some(owner) if owner != me) {
            self.released.wait(&mut state);
        }

        state.readers += 1;
        0
    }

    fn read_unlock(&self, _stamp: Stamp) {
        let mut state = self.state.lock();

        if state.readers == 0 {
            drop(state);
            panic!("ReentrantRwLock read lock released while not held");
        }

        state.readers -= 1;
        if state.readers == 0 {
            self.released.notify_all();
        }
    }

    fn write_lock(&self) -> Stamp {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer == Some(me) {
            state.write_holds += 1;
            return 0;
        }

        while state.writer.is_some() || state.readers > 0 {
            self.released.wait(&mut state);
        }

        state.writer = Some(me);
        state.write_holds = 1;
        0
    }

    fn write_unlock(&self, _stamp: Stamp) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer != Some(me) {
            drop(state);
            panic!("ReentrantRwLock write lock released by a thread that does not hold it");
        }

        state.write_holds -= 1;
        if state.write_holds == 0 {
            state.writer = None;
            self.released.notify_all();
        }
    }

    fn try_write_lock(&self) -> Option<Stamp> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match state.writer {
            Some(owner) if owner == me => {
                state.write_holds += 1;
                Some(0)
            }
            None if state.readers == 0 => {
                state.writer = Some(me);
                state.write_holds = 1;
                Some(0)
            }
            _ => None,
        }
    }

    fn kind(&self) -> LockKind {
        LockKind::ReentrantRw
    }
}
