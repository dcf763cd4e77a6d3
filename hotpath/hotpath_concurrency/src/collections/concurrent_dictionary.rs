//! A `Dictionary` shared between threads behind a lock strategy.

use hotpath_core::utils::DictionaryConfig;

use super::dictionary::{Dictionary, DictionaryKey};
use crate::sync::{AnyLock, Guarded, LockStrategy, ReadGuard, ReentrantRwLock, WriteGuard};

/// Thread-safe hash dictionary.
///
/// Batches of operations go through `read()` or `write()`, which hold the
/// lock until the guard is dropped. The one-shot helpers take the lock for a
/// single call.
pub struct ConcurrentDictionary<K, V, L = ReentrantRwLock> {
    inner: Guarded<Dictionary<K, V>, L>,
}

impl<K: DictionaryKey, V, L: LockStrategy + Default> ConcurrentDictionary<K, V, L> {
    /// Create an empty dictionary with the default capacity.
    pub fn new() -> Self {
        Self::with_lock(Dictionary::new(), L::default())
    }
}

impl<K: DictionaryKey, V, L: LockStrategy + Default> Default for ConcurrentDictionary<K, V, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DictionaryKey, V> ConcurrentDictionary<K, V, AnyLock> {
    /// Create a dictionary as described by `config`.
    pub fn from_config(config: &DictionaryConfig) -> Self {
        Self::with_lock(Dictionary::from_config(config), AnyLock::new(config.lock))
    }
}

impl<K: DictionaryKey, V, L: LockStrategy> ConcurrentDictionary<K, V, L> {
    /// Share `dictionary` behind `lock`.
    pub fn with_lock(dictionary: Dictionary<K, V>, lock: L) -> Self {
        Self {
            inner: Guarded::with_lock(dictionary, lock),
        }
    }

    /// Acquire the read lock.
    pub fn read(&self) -> ReadGuard<'_, Dictionary<K, V>, L> {
        self.inner.read()
    }

    /// Acquire the write lock.
    pub fn write(&self) -> WriteGuard<'_, Dictionary<K, V>, L> {
        self.inner.write()
    }

    /// Clone of the value under `key`.
    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().put(key, value)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the wrapper and return the dictionary.
    pub fn into_inner(self) -> Dictionary<K, V> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SpinLock;
    use hotpath_core::utils::LockKind;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_batch_under_one_lock() {
        let dict: ConcurrentDictionary<u32, String> = ConcurrentDictionary::new();
        {
            let mut guard = dict.write();
            guard.put(1, "a".to_string());
            guard.put(2, "b".to_string());
            guard.remove(&1);
        }

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get_cloned(&2).as_deref(), Some("b"));
        assert!(!dict.contains_key(&1));
    }

    #[test]
    fn test_concurrent_inserts() {
        let dict: Arc<ConcurrentDictionary<u64, u64, SpinLock>> =
            Arc::new(ConcurrentDictionary::new());
        let mut handles = vec![];

        for t in 0..8u64 {
            let dict = Arc::clone(&dict);
            handles.push(thread::spawn(move || {
                for i in 0..250u64 {
                    dict.insert(t * 1000 + i, i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(dict.len(), 2000);
        assert_eq!(dict.get_cloned(&7249), Some(249));
    }

    #[test]
    fn test_from_config() {
        let config = DictionaryConfig {
            lock: LockKind::Stamped,
            ..Default::default()
        };
        let dict: ConcurrentDictionary<u32, u32, AnyLock> =
            ConcurrentDictionary::from_config(&config);
        assert_eq!(dict.insert(1, 1), None);
        assert_eq!(dict.remove(&1), Some(1));
        assert!(dict.is_empty());
        assert_eq!(dict.into_inner().pooled_entries(), 1);
    }
}
