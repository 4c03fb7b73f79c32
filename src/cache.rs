//! Bounded, insertion-order cache fronting the immutable namespaces.
//!
//! Deliberately FIFO rather than LRU: a read never reorders the eviction
//! queue. Names, documents and contracts never change once bound, so
//! promoting an entry on read would add complexity without buying
//! anything.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use tokio::sync::RwLock;

struct Inner<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

/// A bounded cache keyed by driver key strings, evicting the oldest entry
/// once `capacity` is exceeded. Never evicts on read.
pub struct Cache<K, V> {
    capacity: usize,
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Inner {
                map: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::with_capacity(capacity.min(1024)),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.read().await.map.get(key).cloned()
    }

    /// Inserts `value`, evicting the oldest entry if this insert would put
    /// the cache over capacity. A re-insert of an already-cached key does
    /// not move it within the eviction order.
    pub async fn put(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.inner.write().await;
        if guard.map.contains_key(&key) {
            guard.map.insert(key, value);
            return;
        }
        if guard.order.len() >= self.capacity {
            if let Some(oldest) = guard.order.pop_front() {
                guard.map.remove(&oldest);
            }
        }
        guard.order.push_back(key.clone());
        guard.map.insert(key, value);
    }

    pub async fn invalidate(&self, key: &K) {
        let mut guard = self.inner.write().await;
        guard.map.remove(key);
        guard.order.retain(|k| k != key);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evicts_oldest_first() {
        let cache: Cache<String, u32> = Cache::new(2);
        cache.put("a".into(), 1).await;
        cache.put("b".into(), 2).await;
        cache.put("c".into(), 3).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert_eq!(cache.get(&"b".to_string()).await, Some(2));
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn read_does_not_promote() {
        let cache: Cache<String, u32> = Cache::new(2);
        cache.put("a".into(), 1).await;
        cache.put("b".into(), 2).await;
        let _ = cache.get(&"a".to_string()).await;
        cache.put("c".into(), 3).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn zero_capacity_never_stores() {
        let cache: Cache<String, u32> = Cache::new(0);
        cache.put("a".into(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }
}
