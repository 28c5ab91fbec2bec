//! LRU cache of idle unit handles.
//!
//! When the last lock on a unit is released its opened handle is parked here
//! instead of being closed, so the next lock can reuse it. Entries are evicted
//! least recently parked first once the capacity is exceeded; eviction hands
//! the value back to the caller, which drops (closes) it.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;

pub struct IdleCache<K, V> {
    entries: HashMap<K, V>,
    /// Front = oldest, back = newest.
    lru_order: VecDeque<K>,
    /// `None` keeps every idle handle.
    max_entries: Option<usize>,
}

impl<K: Copy + Eq + Hash, V> IdleCache<K, V> {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
            max_entries,
        }
    }

    /// Parks `value` under `key` as the newest entry and returns whatever
    /// had to be evicted to stay within capacity (possibly `value` itself).
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        if let Some(old) = self.remove(key) {
            evicted.push((key, old));
        }
        self.lru_order.push_back(key);
        self.entries.insert(key, value);

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                match self.evict_oldest() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        }
        evicted
    }

    /// Removes and returns the entry for `key`, if parked.
    pub fn take(&mut self, key: K) -> Option<V> {
        self.remove(key)
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        let value = self.entries.remove(&key)?;
        self.lru_order.retain(|k| *k != key);
        Some(value)
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        while let Some(key) = self.lru_order.pop_front() {
            if let Some(value) = self.entries.remove(&key) {
                return Some((key, value));
            }
        }
        None
    }

    /// Empties the cache, returning every parked entry.
    pub fn clear(&mut self) -> Vec<(K, V)> {
        self.lru_order.clear();
        self.entries.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }
}
