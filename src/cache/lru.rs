//! A single capacity-bounded LRU shard.
//!
//! The intrusive doubly-linked list is built from raw pointers for O(1)
//! move-to-front/evict, the same trade-off the rest of this crate's
//! ancestry makes for its hot-path caches: the list never outlives the
//! `HashMap` that owns every node, so the cache type itself stays `Send` and
//! `Sync` even though individual pointers are not.

use std::collections::HashMap;
use std::hash::Hash;
use std::ptr;

struct Node<K, V> {
    key: K,
    value: V,
    charge: u64,
    prev: *mut Node<K, V>,
    next: *mut Node<K, V>,
}

/// A bounded, capacity-accounted LRU cache.
///
/// Eviction never runs a callback internally — [`LruCache::insert`] returns
/// the entries it had to evict to make room, and the caller decides what to
/// do with them (typically: flush them to disk after releasing whatever
/// lock guards this cache). Running the flush while still holding the lock
/// would serialize unrelated lookups behind disk I/O.
pub struct LruCache<K, V> {
    map: HashMap<K, *mut Node<K, V>>,
    head: *mut Node<K, V>,
    tail: *mut Node<K, V>,
    capacity_bytes: u64,
    used_bytes: u64,
}

unsafe impl<K: Send, V: Send> Send for LruCache<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for LruCache<K, V> {}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Builds an empty cache with the given byte capacity.
    pub fn new(capacity_bytes: u64) -> Self {
        LruCache {
            map: HashMap::new(),
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            capacity_bytes,
            used_bytes: 0,
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let ptr = *self.map.get(key)?;
        self.move_to_front(ptr);
        unsafe { Some(&(*ptr).value) }
    }

    /// Inserts or overwrites `key`, evicting least-recently-used entries
    /// until `charge` fits within the remaining capacity. Returns the
    /// evicted `(key, value)` pairs in oldest-first order.
    pub fn insert(&mut self, key: K, value: V, charge: u64) -> Vec<(K, V)> {
        if let Some(&ptr) = self.map.get(&key) {
            unsafe {
                self.used_bytes = self.used_bytes.saturating_sub((*ptr).charge);
                (*ptr).value = value;
                (*ptr).charge = charge;
            }
            self.move_to_front(ptr);
            self.used_bytes += charge;
            return self.evict_to_fit();
        }

        let node = Box::into_raw(Box::new(Node {
            key: key.clone(),
            value,
            charge,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }));
        self.map.insert(key, node);
        self.push_front(node);
        self.used_bytes += charge;

        self.evict_to_fit()
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let ptr = self.map.remove(key)?;
        self.unlink(ptr);
        let node = unsafe { Box::from_raw(ptr) };
        self.used_bytes = self.used_bytes.saturating_sub(node.charge);
        Some(node.value)
    }

    /// Removes every entry, returning them all in least-recently-used-first
    /// order, for a caller that needs to flush everything (e.g. on close).
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.map.len());
        while let Some(pair) = self.pop_tail() {
            out.push(pair);
        }
        out
    }

    fn evict_to_fit(&mut self) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.used_bytes > self.capacity_bytes {
            match self.pop_tail() {
                Some(pair) => evicted.push(pair),
                None => break,
            }
        }
        evicted
    }

    fn pop_tail(&mut self) -> Option<(K, V)> {
        if self.tail.is_null() {
            return None;
        }
        let ptr = self.tail;
        self.unlink(ptr);
        let node = unsafe { Box::from_raw(ptr) };
        self.map.remove(&node.key);
        self.used_bytes = self.used_bytes.saturating_sub(node.charge);
        Some((node.key, node.value))
    }

    fn push_front(&mut self, node: *mut Node<K, V>) {
        unsafe {
            (*node).prev = ptr::null_mut();
            (*node).next = self.head;
            if !self.head.is_null() {
                (*self.head).prev = node;
            }
            self.head = node;
            if self.tail.is_null() {
                self.tail = node;
            }
        }
    }

    fn unlink(&mut self, node: *mut Node<K, V>) {
        unsafe {
            if !(*node).prev.is_null() {
                (*(*node).prev).next = (*node).next;
            } else {
                self.head = (*node).next;
            }
            if !(*node).next.is_null() {
                (*(*node).next).prev = (*node).prev;
            } else {
                self.tail = (*node).prev;
            }
            (*node).prev = ptr::null_mut();
            (*node).next = ptr::null_mut();
        }
    }

    fn move_to_front(&mut self, node: *mut Node<K, V>) {
        if self.head == node {
            return;
        }
        self.unlink(node);
        self.push_front(node);
    }
}

impl<K, V> Drop for LruCache<K, V> {
    fn drop(&mut self) {
        let mut cur = self.head;
        while !cur.is_null() {
            unsafe {
                let next = (*cur).next;
                drop(Box::from_raw(cur));
                cur = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_empty_cache_misses() {
        let mut c: LruCache<u32, u32> = LruCache::new(100);
        assert_eq!(c.get(&1), None);
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut c = LruCache::new(100);
        assert!(c.insert(1u32, "a", 10).is_empty());
        assert_eq!(c.get(&1), Some(&"a"));
    }

    #[test]
    fn eviction_happens_oldest_first_once_over_capacity() {
        let mut c = LruCache::new(20);
        assert!(c.insert(1u32, "a", 10).is_empty());
        assert!(c.insert(2u32, "b", 10).is_empty());
        // 3rd insert pushes used_bytes to 30, over the 20-byte cap: evict 1 (lru tail)
        let evicted = c.insert(3u32, "c", 10);
        assert_eq!(evicted, vec![(1, "a")]);
        assert_eq!(c.get(&1), None);
        assert_eq!(c.get(&2), Some(&"b"));
        assert_eq!(c.get(&3), Some(&"c"));
    }

    #[test]
    fn get_promotes_entry_so_it_survives_eviction() {
        let mut c = LruCache::new(20);
        c.insert(1u32, "a", 10);
        c.insert(2u32, "b", 10);
        assert_eq!(c.get(&1), Some(&"a")); // 1 is now most-recently-used
        let evicted = c.insert(3u32, "c", 10);
        assert_eq!(evicted, vec![(2, "b")]);
        assert_eq!(c.get(&1), Some(&"a"));
    }

    #[test]
    fn remove_drops_entry_and_frees_its_charge() {
        let mut c = LruCache::new(20);
        c.insert(1u32, "a", 10);
        c.insert(2u32, "b", 10);
        assert_eq!(c.remove(&1), Some("a"));
        assert_eq!(c.get(&1), None);
        // capacity freed: a 3rd insert at this charge should not evict 2
        let evicted = c.insert(3u32, "c", 10);
        assert!(evicted.is_empty());
        assert_eq!(c.get(&2), Some(&"b"));
    }

    #[test]
    fn overwriting_an_existing_key_updates_charge_accounting() {
        let mut c = LruCache::new(20);
        c.insert(1u32, "a", 5);
        c.insert(2u32, "b", 5);
        // overwrite 1 with a much larger charge, should now evict 2
        let evicted = c.insert(1u32, "a2", 15);
        assert_eq!(evicted, vec![(2, "b")]);
        assert_eq!(c.get(&1), Some(&"a2"));
    }

    #[test]
    fn drain_empties_the_cache_in_lru_order() {
        let mut c = LruCache::new(100);
        c.insert(1u32, "a", 10);
        c.insert(2u32, "b", 10);
        c.insert(3u32, "c", 10);
        let drained = c.drain();
        assert_eq!(drained, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert!(c.is_empty());
    }
}
