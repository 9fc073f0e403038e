//! Per-stream subscription bookkeeping.
//!
//! A stream rarely holds more than a handful of subscriptions, so entries
//! live in a `Vec` in insertion order. That order is what "first matching
//! pattern" means in topic mode.

/// Insertion-ordered map from subscription key to per-subscription state.
#[derive(Debug)]
pub struct SubscriptionTable<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for SubscriptionTable<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq, V> SubscriptionTable<K, V> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced value keeps its position and is
    /// returned so the caller can tear it down.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Remove the entry for `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.entries)
    }
}
