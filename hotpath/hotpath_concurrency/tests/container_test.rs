//! Integration tests for the lock-strategy-generic containers.
//!
//! These tests check size accounting under mixed add/remove sequences and
//! that readers never see a half-copied buffer while a writer grows it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use hotpath_concurrency::sync::{AnyLock, LockStrategy, ReentrantRwLock, SpinLock, StampedLock};
use hotpath_concurrency::{ArrayView, ConcurrentArray, ConcurrentDictionary};
use hotpath_core::{ArrayConfig, DictionaryConfig, LockKind};

/// Small deterministic generator so runs are repeatable.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn check_add_fast_remove<L: LockStrategy + Default>() {
    let array: ConcurrentArray<u64, L> = ConcurrentArray::with_capacity(4);
    let mut model: Vec<u64> = Vec::new();
    let mut rng = Lcg(42);
    let mut adds = 0usize;
    let mut removes = 0usize;

    for step in 0..5000u64 {
        let mut guard = array.write();
        if model.is_empty() || rng.next() % 3 != 0 {
            guard.add(step);
            model.push(step);
            adds += 1;
        } else {
            let index = (rng.next() as usize) % model.len();
            let removed = guard.fast_remove(index).unwrap();
            assert_eq!(*removed, model.swap_remove(index));
            removes += 1;
        }
        drop(guard);

        assert_eq!(array.len(), adds - removes);
    }

    let read = array.read();
    let contents: Vec<u64> = read.iter().map(|value| *value).collect();
    assert_eq!(contents, model);
    assert!(read.get(model.len()).is_none());
}

#[test]
fn test_add_fast_remove_accounting() {
    check_add_fast_remove::<ReentrantRwLock>();
    check_add_fast_remove::<SpinLock>();
    check_add_fast_remove::<StampedLock>();
}

/// Element `i` always holds the value `i`, so any gap or mismatch seen by a
/// reader means it observed a partially copied buffer.
fn assert_prefix(values: &[Option<usize>]) {
    for (index, value) in values.iter().enumerate() {
        assert_eq!(*value, Some(index), "reader saw a torn buffer at {}", index);
    }
}

fn snapshot(view: &dyn ArrayView<usize>) -> Vec<Option<usize>> {
    (0..view.len())
        .map(|index| view.get(index).map(|value| *value))
        .collect()
}

fn run_readers_against_growing_writer<L: LockStrategy + Default + 'static>(optimistic: bool) {
    const ELEMENTS: usize = 2_000;
    const READERS: usize = 3;

    let array: Arc<ConcurrentArray<usize, L>> = Arc::new(ConcurrentArray::with_capacity(1));
    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(READERS + 1));
    let reads = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let array = Arc::clone(&array);
            let done = Arc::clone(&done);
            let barrier = Arc::clone(&barrier);
            let reads = Arc::clone(&reads);
            thread::spawn(move || {
                barrier.wait();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let values = if optimistic {
                        array.read_optimistic(snapshot)
                    } else {
                        snapshot(&array.read())
                    };
                    assert_prefix(&values);
                    reads.fetch_add(1, Ordering::Relaxed);

                    if finished {
                        break;
                    }
                    // Leave the writer a window; readers are not fair to it.
                    thread::sleep(Duration::from_micros(20));
                }
            })
        })
        .collect();

    barrier.wait();
    for value in 0..ELEMENTS {
        array.write().add(value);
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(array.len(), ELEMENTS);
    assert_prefix(&snapshot(&array.read()));
    assert!(reads.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_read_lock_never_sees_partial_growth() {
    run_readers_against_growing_writer::<ReentrantRwLock>(false);
}

#[test]
fn test_validated_optimistic_never_sees_partial_growth() {
    run_readers_against_growing_writer::<StampedLock>(true);
}

#[test]
fn test_raw_optimistic_stamp_validation() {
    let array: ConcurrentArray<usize, StampedLock> = (0..8).collect();
    let mut rng = Lcg(7);
    let mut validated = 0;

    for round in 0..100 {
        let view = array.try_optimistic_read().unwrap();
        let seen = snapshot(&view);
        if round % 4 == 0 {
            array.write().add(8 + round);
        }

        if view.validate() {
            validated += 1;
            assert_prefix(&seen);
        }

        if rng.next() % 2 == 0 {
            let len = array.len();
            array.write().add(len);
        }
    }

    assert!(validated > 0);
}

#[test]
fn test_array_from_config_with_spin_lock() {
    let config = ArrayConfig {
        initial_capacity: 2,
        lock: LockKind::Spin,
    };
    let array: Arc<ConcurrentArray<u32, AnyLock>> =
        Arc::new(ConcurrentArray::from_config(&config));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let array = Arc::clone(&array);
            thread::spawn(move || {
                for i in 0..250 {
                    array.write().add(t * 1000 + i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(array.len(), 1000);
    assert_eq!(array.lock().kind(), LockKind::Spin);
}

#[test]
fn test_dictionary_churn_reuses_entries() {
    let config = DictionaryConfig {
        lock: LockKind::Stamped,
        ..Default::default()
    };
    let dict: Arc<ConcurrentDictionary<u64, u64, AnyLock>> =
        Arc::new(ConcurrentDictionary::from_config(&config));

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let dict = Arc::clone(&dict);
            thread::spawn(move || {
                for round in 0..100u64 {
                    let mut guard = dict.write();
                    for i in 0..10u64 {
                        guard.put(t * 100 + i, round);
                    }
                    for i in 0..10u64 {
                        assert_eq!(guard.remove(&(t * 100 + i)), Some(round));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let dict = Arc::try_unwrap(dict).ok().unwrap().into_inner();
    assert!(dict.is_empty());
    assert!(dict.pooled_entries() <= 40);
}
