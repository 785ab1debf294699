use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug)]
struct CostEntry<V> {
    value: V,
    cost: u64,
    /// Insertion sequence number, used as the eviction order.
    seq: u64,
}

/// A key/value store bounded by the total cost of its entries.
///
/// Every entry is inserted with a cost (for example the size of the payload it was
/// decoded from). After any [`put`](Self::put) or [`set_limit`](Self::set_limit)
/// returns, the sum of all entry costs is at most the configured limit.
///
/// Entries are evicted oldest-insertion first. Reads never change the eviction order.
#[derive(Debug)]
pub struct CostCache<K, V> {
    entries: HashMap<K, CostEntry<V>>,
    /// Keys by insertion sequence, oldest first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
    total_cost: u64,
    limit: u64,
}

impl<K, V> CostCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache with the given total cost limit.
    pub fn new(limit: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            total_cost: 0,
            limit,
        }
    }

    /// Looks up the value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Returns `true` if the cache holds a value for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// Older entries are evicted until the new entry fits. The entry being inserted
    /// is never evicted by its own insertion: if its cost alone exceeds the limit,
    /// it is not stored and `false` is returned. Any previous value for `key` is removed
    /// either way, while the other entries stay untouched.
    pub fn put(&mut self, key: K, value: V, cost: u64) -> bool {
        self.remove(&key);
        if cost > self.limit {
            return false;
        }

        self.evict_until(self.limit - cost);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, CostEntry { value, cost, seq });
        self.total_cost += cost;

        true
    }

    /// Removes the entry for `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.total_cost -= entry.cost;
        Some(entry.value)
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_cost = 0;
    }

    /// The number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sum of the costs of all entries currently held.
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// The configured total cost limit.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Changes the total cost limit, evicting entries right away if the cache is now over it.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
        self.evict_until(limit);
    }

    /// Evicts the oldest entries until the total cost is at most `budget`.
    fn evict_until(&mut self, budget: u64) {
        while self.total_cost > budget {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_cost -= entry.cost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_put() {
        let mut cache = CostCache::new(100);
        assert!(cache.is_empty());
        assert!(cache.put("a", 1, 10));
        assert!(cache.put("b", 2, 20));

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total_cost(), 30);
    }

    #[test]
    fn test_evicts_to_make_room() {
        let mut cache = CostCache::new(100);
        assert!(cache.put("a", "A", 60));
        assert!(cache.put("b", "B", 60));

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&"B"));
        assert_eq!(cache.total_cost(), 60);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut cache = CostCache::new(100);
        cache.put(1, (), 30);
        cache.put(2, (), 30);
        cache.put(3, (), 30);

        // reads do not influence the eviction order
        assert!(cache.get(&1).is_some());

        cache.put(4, (), 30);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));

        cache.put(5, (), 70);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&4));
        assert!(cache.contains(&5));
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_overwrite_replaces_cost() {
        let mut cache = CostCache::new(100);
        cache.put("a", 1, 50);
        cache.put("b", 2, 40);
        cache.put("a", 3, 10);

        assert_eq!(cache.get(&"a"), Some(&3));
        assert_eq!(cache.total_cost(), 50);

        // "a" was re-inserted after "b", so "b" goes first
        cache.put("c", 4, 60);
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let mut cache = CostCache::new(100);
        cache.put("a", 1, 40);

        assert!(!cache.put("huge", 2, 101));
        assert_eq!(cache.get(&"huge"), None);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.total_cost(), 40);

        assert!(cache.put("exact", 3, 100));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_oversized_overwrite_drops_previous_value() {
        let mut cache = CostCache::new(100);
        cache.put("k", "old", 10);
        cache.put("other", "kept", 10);

        assert!(!cache.put("k", "new", 200));
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.get(&"other"), Some(&"kept"));
        assert_eq!(cache.total_cost(), 10);
    }

    #[test]
    fn test_never_exceeds_limit() {
        let mut cache = CostCache::new(1_000);
        for i in 0..500u64 {
            let cost = (i * 37) % 300 + 1;
            assert!(cache.put(i, i, cost));
            assert!(cache.total_cost() <= cache.limit());
            assert_eq!(cache.get(&i), Some(&i));
        }
    }

    #[test]
    fn test_set_limit_evicts() {
        let mut cache = CostCache::new(100);
        cache.put("a", (), 30);
        cache.put("b", (), 30);
        cache.put("c", (), 30);

        cache.set_limit(50);
        assert_eq!(cache.limit(), 50);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"c"));
        assert_eq!(cache.total_cost(), 30);

        cache.set_limit(0);
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = CostCache::new(100);
        cache.put("a", 1, 10);
        cache.put("b", 2, 10);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert_eq!(cache.total_cost(), 10);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
        assert!(cache.put("c", 3, 100));
    }
}
