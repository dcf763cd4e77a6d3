//! Chained hash dictionary with pooled entries.
//!
//! Entries live in an arena and are linked into buckets by index. Removing
//! a key clears its entry and puts it on a free list, and later inserts take
//! entries from that list before growing the arena, so steady-state churn
//! does not allocate.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use hotpath_core::traits::Reusable;
use hotpath_core::utils::DictionaryConfig;

const DEFAULT_CAPACITY: usize = 16;
const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Mix the high bits of `h` into the low bits used for bucket selection.
///
/// Integer keys hash by bit pattern, so without this, keys that differ only
/// in their upper bits would all land in the same bucket.
pub fn spread(h: u32) -> u32 {
    let h = h ^ (h >> 20) ^ (h >> 12);
    h ^ (h >> 7) ^ (h >> 4)
}

/// A key usable in a `Dictionary`.
pub trait DictionaryKey: Eq {
    /// Unspread 32-bit hash of the key.
    fn raw_hash(&self) -> u32;

    /// Hash used for bucket selection.
    fn spread_hash(&self) -> u32 {
        spread(self.raw_hash())
    }
}

macro_rules! narrow_key {
    ($($ty:ty),*) => {
        $(
            impl DictionaryKey for $ty {
                fn raw_hash(&self) -> u32 {
                    *self as u32
                }
            }
        )*
    };
}

macro_rules! wide_key {
    ($($ty:ty),*) => {
        $(
            impl DictionaryKey for $ty {
                fn raw_hash(&self) -> u32 {
                    let bits = *self as u64;
                    (bits ^ (bits >> 32)) as u32
                }
            }
        )*
    };
}

narrow_key!(i8, u8, i16, u16, i32, u32);
wide_key!(i64, u64, isize, usize);

impl DictionaryKey for String {
    fn raw_hash(&self) -> u32 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        let bits = hasher.finish();
        (bits ^ (bits >> 32)) as u32
    }
}

struct Entry<K, V> {
    hash: u32,
    key: Option<K>,
    value: Option<V>,
    next: Option<usize>,
}

impl<K, V> Reusable for Entry<K, V> {
    fn free(&mut self) {
        self.hash = 0;
        self.key = None;
        self.value = None;
        self.next = None;
    }
}

/// Single-threaded hash dictionary.
///
/// Wrap it in a `ConcurrentDictionary` to share it between threads.
pub struct Dictionary<K, V> {
    entries: Vec<Entry<K, V>>,
    buckets: Vec<Option<usize>>,
    free: Vec<usize>,
    len: usize,
    load_factor: f32,
    threshold: usize,
}

impl<K: DictionaryKey, V> Default for Dictionary<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DictionaryKey, V> Dictionary<K, V> {
    /// Create a dictionary with 16 buckets and a 0.75 load factor.
    pub fn new() -> Self {
        Self::with_capacity_and_load_factor(DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR)
    }

    /// Create a dictionary with at least `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_load_factor(capacity, DEFAULT_LOAD_FACTOR)
    }

    /// Create a dictionary with at least `capacity` buckets that grows once
    /// its size exceeds `capacity * load_factor`.
    ///
    /// Non-positive or non-finite load factors fall back to 0.75.
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f32) -> Self {
        let load_factor = if load_factor.is_finite() && load_factor > 0.0 {
            load_factor
        } else {
            DEFAULT_LOAD_FACTOR
        };
        let buckets = capacity.max(1).next_power_of_two();

        Self {
            entries: Vec::new(),
            buckets: vec![None; buckets],
            free: Vec::new(),
            len: 0,
            load_factor,
            threshold: threshold(buckets, load_factor),
        }
    }

    /// Create a dictionary as described by `config`. The lock is ignored.
    pub fn from_config(config: &DictionaryConfig) -> Self {
        Self::with_capacity_and_load_factor(config.initial_capacity, config.load_factor)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of cleared entries waiting to be reused.
    pub fn pooled_entries(&self) -> usize {
        self.free.len()
    }

    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    fn find(&self, key: &K) -> Option<usize> {
        let hash = key.spread_hash();
        let mut cursor = self.buckets[self.bucket_of(hash)];

        while let Some(index) = cursor {
            let entry = &self.entries[index];
            if entry.hash == hash && entry.key.as_ref() == Some(key) {
                return Some(index);
            }
            cursor = entry.next;
        }

        None
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key)
            .and_then(|index| self.entries[index].value.as_ref())
    }

    /// Mutable value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key)
            .and_then(|index| self.entries[index].value.as_mut())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.find(&key) {
            Some(index) => self.entries[index].value.replace(value),
            None => {
                let hash = key.spread_hash();
                self.insert_new(hash, key, Some(value));
                None
            }
        }
    }

    /// Value under `key`, inserting the result of `f` if it is missing.
    ///
    /// `f` runs before the entry is linked, so a panic in it leaves the
    /// dictionary unchanged.
    pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> &mut V {
        let index = match self.find(&key) {
            Some(index) => index,
            None => {
                let value = f();
                let hash = key.spread_hash();
                let index = self.insert_new(hash, key, None);
                return self.entries[index].value.insert(value);
            }
        };

        self.entries[index].value.get_or_insert_with(f)
    }

    /// Remove `key`, returning its value. The entry goes back to the pool.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = key.spread_hash();
        let bucket = self.bucket_of(hash);

        let mut previous: Option<usize> = None;
        let mut cursor = self.buckets[bucket];

        while let Some(index) = cursor {
            let next = self.entries[index].next;
            let entry = &self.entries[index];

            if entry.hash == hash && entry.key.as_ref() == Some(key) {
                match previous {
                    Some(prev) => self.entries[prev].next = next,
                    None => self.buckets[bucket] = next,
                }

                let value = self.entries[index].value.take();
                self.release_entry(index);
                self.len -= 1;
                return value;
            }

            previous = Some(index);
            cursor = next;
        }

        None
    }

    /// Remove every entry. All entries go back to the pool.
    pub fn clear(&mut self) {
        for index in 0..self.entries.len() {
            if self.entries[index].key.is_some() {
                self.release_entry(index);
            }
        }

        self.buckets.fill(None);
        self.len = 0;
    }

    /// Iterate over key/value pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|entry| match (&entry.key, &entry.value) {
                (Some(key), Some(value)) => Some((key, value)),
                _ => None,
            })
    }

    /// Iterate over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Iterate over values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Call `f` on every key/value pair.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self.iter() {
            f(key, value);
        }
    }

    fn insert_new(&mut self, hash: u32, key: K, value: Option<V>) -> usize {
        let bucket = self.bucket_of(hash);
        let next = self.buckets[bucket];

        let index = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.reuse();
                entry.hash = hash;
                entry.key = Some(key);
                entry.value = value;
                entry.next = next;
                index
            }
            None => {
                self.entries.push(Entry {
                    hash,
                    key: Some(key),
                    value,
                    next,
                });
                self.entries.len() - 1
            }
        };

        self.buckets[bucket] = Some(index);
        self.len += 1;

        if self.len > self.threshold {
            self.resize(self.buckets.len() * 2);
        }

        index
    }

    fn release_entry(&mut self, index: usize) {
        self.entries[index].free();
        self.free.push(index);
    }

    fn resize(&mut self, buckets: usize) {
        self.buckets = vec![None; buckets];
        self.threshold = threshold(buckets, self.load_factor);

        for index in 0..self.entries.len() {
            if self.entries[index].key.is_none() {
                continue;
            }
            let bucket = self.bucket_of(self.entries[index].hash);
            self.entries[index].next = self.buckets[bucket];
            self.buckets[bucket] = Some(index);
        }
    }
}

fn threshold(buckets: usize, load_factor: f32) -> usize {
    (buckets as f32 * load_factor) as usize
}

impl<K: DictionaryKey + fmt::Debug, V: fmt::Debug> fmt::Debug for Dictionary<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: DictionaryKey, V> FromIterator<(K, V)> for Dictionary<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dictionary = Self::new();
        for (key, value) in iter {
            dictionary.put(key, value);
        }
        dictionary
    }
}
