//! Deletion Memo: remembers which keys have already been invalidated from
//! source so SET does not redundantly re-issue DEL.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

const DEFAULT_CAPACITY: usize = 1_000_000;

/// Bounded, concurrency-safe record of keys already deleted from source.
///
/// The original migration tool memoizes every key it has ever deleted in an
/// unbounded set, which leaks over the lifetime of a long-running process.
/// This bounds it with an LRU: once full, the least-recently-marked key is
/// evicted and would simply be re-DELeted (a no-op against an already-empty
/// source key) the next time its SET comes through.
pub struct DeletionMemo {
    cache: Mutex<LruCache<String, ()>>,
}

impl DeletionMemo {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.lock().contains(key)
    }

    pub fn mark(&self, key: &str) {
        self.cache.lock().put(key.to_string(), ());
    }
}

impl Default for DeletionMemo {
    fn default() -> Self {
        Self::new()
    }
}
