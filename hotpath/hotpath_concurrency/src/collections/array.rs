//! Growable array guarded by a pluggable lock strategy.
//!
//! The backing buffer is published through an `ArcSwap` and every slot is an
//! atomic `Arc` pointer. Writers mutate through an `ArrayWriteGuard` while
//! holding the write lock. Readers either hold the read lock or take an
//! optimistic stamp and validate it afterwards; in both cases they see
//! either the old buffer or the fully copied new one, never a partial copy.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use hotpath_core::error::ContainerError;
use hotpath_core::utils::ArrayConfig;

use crate::sync::{AnyLock, LockStrategy, ReentrantRwLock, Stamp};

const DEFAULT_CAPACITY: usize = 10;

struct Buffer<T> {
    slots: Box<[ArcSwapOption<T>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ArcSwapOption::empty()).collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Next capacity when `needed` slots do not fit in `current`.
fn grown_capacity(current: usize, needed: usize) -> usize {
    needed.max(current + current / 2).max(current + 1)
}

/// A growable array of shared elements whose lock strategy is chosen at
/// construction.
///
/// Slots `[0, len)` always hold an element. Elements are stored as `Arc<T>`
/// so readers can hold on to one after the lock is released.
pub struct ConcurrentArray<T, L = ReentrantRwLock> {
    lock: L,
    buffer: ArcSwap<Buffer<T>>,
    size: AtomicUsize,
}

impl<T, L: LockStrategy + Default> ConcurrentArray<T, L> {
    /// Create an empty array with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty array with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_lock(capacity, L::default())
    }
}

impl<T, L: LockStrategy + Default> Default for ConcurrentArray<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentArray<T, AnyLock> {
    /// Create an array as described by `config`.
    pub fn from_config(config: &ArrayConfig) -> Self {
        Self::with_lock(config.initial_capacity, AnyLock::new(config.lock))
    }
}

impl<T, L: LockStrategy> ConcurrentArray<T, L> {
    /// Create an empty array guarded by `lock`.
    pub fn with_lock(capacity: usize, lock: L) -> Self {
        Self {
            lock,
            buffer: ArcSwap::from_pointee(Buffer::with_capacity(capacity)),
            size: AtomicUsize::new(0),
        }
    }

    /// Number of elements, read without locking.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Whether the array is empty, read without locking.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.load().capacity()
    }

    /// The lock strategy guarding this array.
    pub fn lock(&self) -> &L {
        &self.lock
    }

    /// Acquire the read lock.
    ///
    /// The guard releases the lock on the thread that acquired it and cannot
    /// be moved to another one:
    ///
    /// ```compile_fail
    /// use hotpath_concurrency::ConcurrentArray;
    ///
    /// let array: ConcurrentArray<u32> = ConcurrentArray::new();
    /// let guard = array.read();
    /// std::thread::scope(|scope| {
    ///     scope.spawn(move || drop(guard));
    /// });
    /// ```
    pub fn read(&self) -> ArrayReadGuard<'_, T, L> {
        let stamp = self.lock.read_lock();
        ArrayReadGuard {
            array: self,
            stamp,
            _not_send: PhantomData,
        }
    }

    /// Acquire the write lock.
    ///
    /// Like the read guard, the write guard stays on the acquiring thread:
    ///
    /// ```compile_fail
    /// use hotpath_concurrency::ConcurrentArray;
    ///
    /// let array: ConcurrentArray<u32> = ConcurrentArray::new();
    /// let mut guard = array.write();
    /// std::thread::scope(|scope| {
    ///     scope.spawn(move || guard.add(1));
    /// });
    /// ```
    pub fn write(&self) -> ArrayWriteGuard<'_, T, L> {
        let stamp = self.lock.write_lock();
        ArrayWriteGuard {
            array: self,
            stamp,
            _not_send: PhantomData,
        }
    }

    /// Acquire the write lock if it is immediately available.
    pub fn try_write(&self) -> Option<ArrayWriteGuard<'_, T, L>> {
        self.lock
            .try_write_lock()
            .map(|stamp| ArrayWriteGuard {
                array: self,
                stamp,
                _not_send: PhantomData,
            })
    }

    /// Start an optimistic read.
    ///
    /// Returns `None` when the strategy has no optimistic mode or a writer is
    /// active. Anything read through the returned view must be discarded
    /// unless `validate` succeeds afterwards.
    pub fn try_optimistic_read(&self) -> Option<OptimisticRead<'_, T, L>> {
        match self.lock.try_optimistic_read() {
            0 => None,
            stamp => Some(OptimisticRead { array: self, stamp }),
        }
    }

    /// Run `f` under an optimistic stamp, falling back to the read lock when
    /// the stamp cannot be taken or does not validate.
    pub fn read_optimistic<R>(&self, f: impl Fn(&dyn ArrayView<T>) -> R) -> R {
        if let Some(view) = self.try_optimistic_read() {
            let result = f(&view as &dyn ArrayView<T>);
            if view.validate() {
                return result;
            }
        }

        let guard = self.read();
        f(&guard as &dyn ArrayView<T>)
    }

    fn get_slot(&self, index: usize) -> Option<Arc<T>> {
        if index >= self.len() {
            return None;
        }
        self.buffer
            .load()
            .slots
            .get(index)
            .and_then(|slot| slot.load_full())
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        let size = self.len();
        let buffer = self.buffer.load();
        buffer.slots[..size.min(buffer.capacity())]
            .iter()
            .filter_map(|slot| slot.load_full())
            .collect()
    }

    fn ensure_capacity(&self, needed: usize) {
        let current = self.buffer.load_full();
        if needed <= current.capacity() {
            return;
        }

        let grown = Buffer::with_capacity(grown_capacity(current.capacity(), needed));
        let size = self.len();
        for (old, new) in current.slots[..size].iter().zip(grown.slots.iter()) {
            new.store(old.load_full());
        }

        // Publish only once the copy is complete.
        self.buffer.store(Arc::new(grown));
    }
}

impl<T, L: LockStrategy + Default> FromIterator<T> for ConcurrentArray<T, L> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        let array = Self::with_capacity(items.len().max(1));
        array.write().add_all(items);
        array
    }
}

impl<T: fmt::Debug, L: LockStrategy> fmt::Debug for ConcurrentArray<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.read().iter()).finish()
    }
}

/// Read operations shared by every way of looking into a `ConcurrentArray`.
pub trait ArrayView<T> {
    /// Element at `index`, or `None` past the end.
    fn get(&self, index: usize) -> Option<Arc<T>>;

    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared access to a `ConcurrentArray` under its read lock.
pub struct ArrayReadGuard<'a, T, L: LockStrategy> {
    array: &'a ConcurrentArray<T, L>,
    stamp: Stamp,
    _not_send: PhantomData<*const ()>,
}

impl<T, L: LockStrategy> ArrayReadGuard<'_, T, L> {
    /// Element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Iterate over the elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.array.snapshot()
    }

    /// Position of `value`, by identity.
    pub fn index_of(&self, value: &Arc<T>) -> Option<usize> {
        self.iter().position(|item| Arc::ptr_eq(&item, value))
    }

    /// Whether `value` is stored, by identity.
    pub fn contains(&self, value: &Arc<T>) -> bool {
        self.index_of(value).is_some()
    }
}

impl<T, L: LockStrategy> ArrayView<T> for ArrayReadGuard<'_, T, L> {
    fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    fn len(&self) -> usize {
        self.array.len()
    }
}

impl<T, L: LockStrategy> Drop for ArrayReadGuard<'_, T, L> {
    fn drop(&mut self) {
        self.array.lock.read_unlock(self.stamp);
    }
}

/// Exclusive access to a `ConcurrentArray` under its write lock.
pub struct ArrayWriteGuard<'a, T, L: LockStrategy> {
    array: &'a ConcurrentArray<T, L>,
    stamp: Stamp,
    _not_send: PhantomData<*const ()>,
}

impl<T, L: LockStrategy> ArrayWriteGuard<'_, T, L> {
    /// Element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Iterate over the elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.array.snapshot()
    }

    /// Position of `value`, by identity.
    pub fn index_of(&self, value: &Arc<T>) -> Option<usize> {
        self.iter().position(|item| Arc::ptr_eq(&item, value))
    }

    /// Whether `value` is stored, by identity.
    pub fn contains(&self, value: &Arc<T>) -> bool {
        self.index_of(value).is_some()
    }

    /// Append `value` and return the shared handle stored in the array.
    pub fn add(&mut self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.add_arc(Arc::clone(&value));
        value
    }

    /// Append an already shared element.
    pub fn add_arc(&mut self, value: Arc<T>) {
        let size = self.array.len();
        self.array.ensure_capacity(size + 1);
        self.array.buffer.load().slots[size].store(Some(value));
        self.array.size.store(size + 1, Ordering::Release);
    }

    /// Append every element of `values`, growing at most once.
    pub fn add_all(&mut self, values: impl IntoIterator<Item = T>) {
        let values: Vec<Arc<T>> = values.into_iter().map(Arc::new).collect();
        if values.is_empty() {
            return;
        }

        let size = self.array.len();
        self.array.ensure_capacity(size + values.len());

        let buffer = self.array.buffer.load();
        let added = values.len();
        for (slot, value) in buffer.slots[size..].iter().zip(values) {
            slot.store(Some(value));
        }
        self.array.size.store(size + added, Ordering::Release);
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: T) -> Result<Arc<T>, ContainerError> {
        let size = self.array.len();
        let out_of_bounds = ContainerError::IndexOutOfBounds { index, size };
        if index >= size {
            return Err(out_of_bounds);
        }

        self.array.buffer.load().slots[index]
            .swap(Some(Arc::new(value)))
            .ok_or(out_of_bounds)
    }

    /// Remove the element at `index` by moving the last element into its
    /// slot. O(1), does not preserve order.
    pub fn fast_remove(&mut self, index: usize) -> Option<Arc<T>> {
        let size = self.array.len();
        if index >= size {
            return None;
        }

        let last = size - 1;
        let buffer = self.array.buffer.load();
        let removed = if index == last {
            buffer.slots[last].swap(None)
        } else {
            let moved = buffer.slots[last].swap(None);
            buffer.slots[index].swap(moved)
        };

        self.array.size.store(last, Ordering::Release);
        removed
    }

    /// Remove the element at `index` and shift everything after it left.
    /// O(n), preserves order.
    pub fn slow_remove(&mut self, index: usize) -> Option<Arc<T>> {
        let size = self.array.len();
        if index >= size {
            return None;
        }

        let buffer = self.array.buffer.load();
        let removed = buffer.slots[index].load_full();
        for i in index..size - 1 {
            buffer.slots[i].store(buffer.slots[i + 1].load_full());
        }
        buffer.slots[size - 1].store(None);

        self.array.size.store(size - 1, Ordering::Release);
        removed
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> Option<Arc<T>> {
        let size = self.array.len();
        if size == 0 {
            return None;
        }

        let removed = self.array.buffer.load().slots[size - 1].swap(None);
        self.array.size.store(size - 1, Ordering::Release);
        removed
    }

    /// Remove `value`, by identity, preserving order. Returns whether it was
    /// present.
    pub fn remove(&mut self, value: &Arc<T>) -> bool {
        match self.index_of(value) {
            Some(index) => self.slow_remove(index).is_some(),
            None => false,
        }
    }

    /// Remove every element. Capacity is kept.
    pub fn clear(&mut self) {
        let size = self.array.len();
        self.array.size.store(0, Ordering::Release);

        let buffer = self.array.buffer.load();
        for slot in &buffer.slots[..size] {
            slot.store(None);
        }
    }

    /// Shrink the buffer to the number of elements.
    pub fn trim_to_size(&mut self) {
        let size = self.array.len();
        let current = self.array.buffer.load_full();
        if current.capacity() == size {
            return;
        }

        let trimmed = Buffer::with_capacity(size);
        for (old, new) in current.slots[..size].iter().zip(trimmed.slots.iter()) {
            new.store(old.load_full());
        }
        self.array.buffer.store(Arc::new(trimmed));
    }
}

impl<T, L: LockStrategy> ArrayView<T> for ArrayWriteGuard<'_, T, L> {
    fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    fn len(&self) -> usize {
        self.array.len()
    }
}

impl<T, L: LockStrategy> Drop for ArrayWriteGuard<'_, T, L> {
    fn drop(&mut self) {
        self.array.lock.write_unlock(self.stamp);
    }
}

/// A lock-free view taken under an optimistic stamp.
///
/// Reads never block and never observe freed memory, but they may see a
/// mix of states if a writer ran concurrently. Call `validate` before using
/// anything read through this view.
pub struct OptimisticRead<'a, T, L: LockStrategy> {
    array: &'a ConcurrentArray<T, L>,
    stamp: Stamp,
}

impl<T, L: LockStrategy> OptimisticRead<'_, T, L> {
    /// Element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// The optimistic stamp.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Whether no writer ran since the stamp was taken.
    pub fn validate(&self) -> bool {
        self.array.lock.validate(self.stamp)
    }
}

impl<T, L: LockStrategy> ArrayView<T> for OptimisticRead<'_, T, L> {
    fn get(&self, index: usize) -> Option<Arc<T>> {
        self.array.get_slot(index)
    }

    fn len(&self) -> usize {
        self.array.len()
    }
}
