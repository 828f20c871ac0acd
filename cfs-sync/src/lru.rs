//! A bounded, time-bounded cache with reentrant lookups (C14).
//!
//! Eviction here is by insertion wall-time rather than access
//! order, so this isn't the doubly-linked-list access-order LRU of
//! `pbs-tools::lru_cache::LruCache` — it instead follows that
//! module's sibling, `pbs-tools::async_lru_cache::AsyncLruCache`, for the
//! one property that actually matters here: the cache's mutex is dropped
//! before calling the caller-supplied compute function (there:
//! `// drop Mutex before awaiting any future`), so a `compute` that calls
//! back into [`TimeBoundedCache::get`] for a different key does not
//! deadlock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

struct Entry<V> {
    value: V,
    inserted_at: u64,
}

/// Bounded mapping where an entry is considered fresh for `freshness` time
/// units past its insertion time. `get` returns a cached value if still
/// fresh; otherwise it calls `compute` (without holding the internal lock)
/// and caches the result under the timestamp passed in.
pub struct TimeBoundedCache<K, V> {
    capacity: usize,
    freshness: u64,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TimeBoundedCache<K, V> {
    pub fn new(capacity: usize, freshness: u64) -> Self {
        Self { capacity: capacity.max(1), freshness, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached value for `key` if it was inserted no longer
    /// than `freshness` time units before `now`; otherwise calls `compute`
    /// to produce one, inserts it stamped at `now`, and returns it.
    ///
    /// `compute` may itself call `get` reentrantly (including on `self`),
    /// since the lock is released before `compute` runs.
    pub fn get(&self, now: u64, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.fresh(now, &key) {
            return value;
        }
        let value = compute();
        self.insert(now, key, value.clone());
        value
    }

    fn fresh(&self, now: u64, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if now.saturating_sub(entry.inserted_at) <= self.freshness {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn insert(&self, now: u64, key: K, value: V) {
        let mut entries = self.entries.lock();
        entries.insert(key, Entry { value, inserted_at: now });
        if entries.len() > self.capacity {
            if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.inserted_at).map(|(k, _)| k.clone()) {
                entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn a_fresh_entry_is_returned_without_recomputing() {
        let cache: TimeBoundedCache<u32, u32> = TimeBoundedCache::new(4, 10);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            42
        };
        assert_eq!(cache.get(0, 1, compute), 42);
        assert_eq!(cache.get(5, 1, compute), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn a_stale_entry_is_recomputed() {
        let cache: TimeBoundedCache<u32, u32> = TimeBoundedCache::new(4, 10);
        cache.get(0, 1, || 42);
        let recomputed = cache.get(11, 1, || 99);
        assert_eq!(recomputed, 99);
    }

    #[test]
    fn eviction_removes_the_oldest_entry_once_over_capacity() {
        let cache: TimeBoundedCache<u32, u32> = TimeBoundedCache::new(2, 1000);
        cache.get(0, 1, || 1);
        cache.get(1, 2, || 2);
        cache.get(2, 3, || 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.fresh(2, &1), None, "the oldest entry should have been evicted");
        assert_eq!(cache.fresh(2, &2), Some(2));
        assert_eq!(cache.fresh(2, &3), Some(3));
    }

    #[test]
    fn compute_may_reentrantly_query_the_same_cache() {
        let cache: TimeBoundedCache<u32, u32> = TimeBoundedCache::new(4, 1000);
        cache.get(0, 1, || 10);
        let value = cache.get(0, 2, || cache.get(0, 1, || 999) + 1);
        assert_eq!(value, 11, "the nested get should see the already-cached value for key 1");
    }
}
