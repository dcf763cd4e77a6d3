//! Containers whose lock strategy is chosen at construction.
//!
//! - `array`: growable array with optimistic reads
//! - `dictionary`: single-threaded chained hash dictionary with pooled entries
//! - `concurrent_dictionary`: the dictionary behind a lock strategy

pub mod array;
pub mod concurrent_dictionary;
pub mod dictionary;

pub use array::{ArrayReadGuard, ArrayView, ArrayWriteGuard, ConcurrentArray, OptimisticRead};
pub use concurrent_dictionary::ConcurrentDictionary;
pub use dictionary::{Dictionary, DictionaryKey};
