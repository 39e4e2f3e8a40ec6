//! A capacity-bounded LRU split into independent, separately-locked shards.
//!
//! Splitting one big cache into `S_lru` shards, each behind its own
//! `parking_lot::Mutex`, is what lets lookups against unrelated keys proceed
//! in parallel instead of fighting over a single lock. Eviction callbacks
//! always run after the owning shard's lock has been released.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use super::lru::LruCache;
use crate::hash::{prefix, shard_hash_64};

/// A sharded, capacity-bounded LRU cache.
///
/// `K` must be hashable into shard-routing bytes via [`ShardKey::route_bytes`];
/// this is independent of whatever `Hash` impl `K` uses for its `HashMap`
/// bucket inside a shard.
pub struct ShardedLru<K, V> {
    shards: Vec<Mutex<LruCache<K, V>>>,
    shard_bits: u32,
    on_evict: Option<Arc<dyn Fn(K, V) + Send + Sync>>,
}

/// Types usable as a [`ShardedLru`] key must expose a stable routing hash.
pub trait ShardKey {
    /// Hash this key's shard (and in-shard) routing is derived from.
    fn route_hash(&self) -> u64;
}

impl ShardKey for Vec<u8> {
    fn route_hash(&self) -> u64 {
        shard_hash_64(self.as_slice())
    }
}

impl ShardKey for u32 {
    fn route_hash(&self) -> u64 {
        shard_hash_64(&self.to_le_bytes())
    }
}

impl<K, V> ShardedLru<K, V>
where
    K: Hash + Eq + Clone + ShardKey,
{
    /// Builds a sharded cache with `shards` independent shards sharing
    /// `total_capacity_bytes` divided as evenly as possible.
    pub fn new(shards: usize, total_capacity_bytes: u64) -> Self {
        Self::with_eviction_callback(shards, total_capacity_bytes, None)
    }

    /// Same as [`ShardedLru::new`], but invokes `on_evict` for every entry a
    /// shard evicts to make room, after that shard's lock is released.
    pub fn with_eviction_callback(
        shards: usize,
        total_capacity_bytes: u64,
        on_evict: Option<Arc<dyn Fn(K, V) + Send + Sync>>,
    ) -> Self {
        assert!(
            shards > 0 && shards.is_power_of_two(),
            "shard count must be a power of two"
        );
        let per_shard = total_capacity_bytes.div_ceil(shards as u64);
        let shard_bits = shards.trailing_zeros();
        let shards = (0..shards)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();
        ShardedLru {
            shards,
            shard_bits,
            on_evict,
        }
    }

    /// Shards on the high `shard_bits` bits of the key's routing hash,
    /// matching `ShardedHashIndex`'s top-level routing (§4.3).
    fn shard_index(&self, key: &K) -> usize {
        prefix(key.route_hash(), self.shard_bits) as usize
    }

    /// Looks up `key`. Clones the value out from under the shard lock since
    /// callers generally need to use the value after releasing it.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let idx = self.shard_index(key);
        let mut shard = self.shards[idx].lock();
        shard.get(key).cloned()
    }

    /// Inserts `key` -> `value` charged at `charge` bytes, running any
    /// configured eviction callback on whatever was evicted to make room.
    pub fn insert(&self, key: K, value: V, charge: u64) {
        let idx = self.shard_index(&key);
        let evicted = {
            let mut shard = self.shards[idx].lock();
            shard.insert(key, value, charge)
        };
        self.flush_evicted(evicted);
    }

    /// Removes `key` from its shard, returning its value if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let idx = self.shard_index(key);
        let mut shard = self.shards[idx].lock();
        shard.remove(key)
    }

    /// Drains every shard, flushing whatever was left through the eviction
    /// callback. Used when closing an index to persist dirty pages.
    pub fn flush_all(&self) {
        for shard in &self.shards {
            let drained = shard.lock().drain();
            self.flush_evicted(drained);
        }
    }

    fn flush_evicted(&self, evicted: Vec<(K, V)>) {
        if evicted.is_empty() {
            return;
        }
        if let Some(cb) = &self.on_evict {
            for (k, v) in evicted {
                cb(k, v);
            }
        }
    }

    /// Total number of entries currently cached across every shard.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Whether every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn insert_then_get_round_trips_across_shards() {
        let cache: ShardedLru<Vec<u8>, Vec<u8>> = ShardedLru::new(4, 1024);
        cache.insert(b"a".to_vec(), b"1".to_vec(), 1);
        cache.insert(b"b".to_vec(), b"2".to_vec(), 1);
        assert_eq!(cache.get(&b"a".to_vec()), Some(b"1".to_vec()));
        assert_eq!(cache.get(&b"b".to_vec()), Some(b"2".to_vec()));
        assert_eq!(cache.get(&b"missing".to_vec()), None);
    }

    #[test]
    fn eviction_callback_runs_after_lock_release() {
        let evicted_count = Arc::new(AtomicUsize::new(0));
        let counter = evicted_count.clone();
        let cache: ShardedLru<u32, u32> = ShardedLru::with_eviction_callback(
            1,
            16,
            Some(Arc::new(move |_k, _v| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        for i in 0..10u32 {
            cache.insert(i, i, 8);
        }
        assert!(evicted_count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn remove_clears_entry() {
        let cache: ShardedLru<u32, u32> = ShardedLru::new(2, 1024);
        cache.insert(1, 100, 1);
        assert_eq!(cache.remove(&1), Some(100));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn flush_all_drains_and_invokes_callback_for_every_remaining_entry() {
        let flushed = Arc::new(Mutex::new(Vec::new()));
        let sink = flushed.clone();
        let cache: ShardedLru<u32, u32> = ShardedLru::with_eviction_callback(
            4,
            1024,
            Some(Arc::new(move |k, v| sink.lock().push((k, v)))),
        );
        for i in 0..8u32 {
            cache.insert(i, i * 10, 1);
        }
        cache.flush_all();
        assert_eq!(flushed.lock().len(), 8);
        assert!(cache.is_empty());
    }
}
