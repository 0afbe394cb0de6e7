//! In-memory caches backing the two trees.
//!
//! The hyper tree keeps every batch at or above its cache height limit in a
//! [`ModifiableCache`] — a fixed-capacity map updated in place on every
//! insertion. The history tree's frozen nodes never change, so its
//! [`PassThroughCache`] owns no memory and simply reads through to the
//! store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use qed_storage::{Store, StoreError, Table};
use tracing::warn;

/// Fixed-capacity map from cache key to raw batch bytes.
///
/// Capacity is a hard bound sized for the working set; there is no
/// eviction. A put that would grow past capacity is dropped with a
/// warning, which only happens when the cache was sized too small for the
/// digest width in use.
pub struct ModifiableCache {
    max_entries: usize,
    inner: Mutex<HashMap<Vec<u8>, Bytes>>,
}

impl ModifiableCache {
    /// Create a cache bounded to `max_entries` batches.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace an entry.
    pub fn put(&self, key: Vec<u8>, value: Bytes) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if !inner.contains_key(&key) && inner.len() >= self.max_entries {
            warn!(capacity = self.max_entries, "hyper cache at capacity, dropping batch");
            return;
        }
        inner.insert(key, value);
    }

    /// Look up an entry.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.inner.lock().expect("cache lock poisoned").get(key).cloned()
    }

    /// Number of cached batches.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("cache lock poisoned").is_empty()
    }

    /// Drop every entry. Used when rebuilding from the store.
    pub fn clear(&self) {
        self.inner.lock().expect("cache lock poisoned").clear();
    }
}

/// Read-only view over one store table; misses delegate to the store.
pub struct PassThroughCache {
    store: Arc<Store>,
    table: Table,
}

impl PassThroughCache {
    /// Create a view over `table`.
    pub fn new(store: Arc<Store>, table: Table) -> Self {
        Self { store, table }
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.store.get(self.table, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qed_storage::Mutation;

    #[test]
    fn test_put_get_roundtrip() {
        let cache = ModifiableCache::new(4);
        cache.put(vec![1], Bytes::from_static(b"batch"));
        assert_eq!(cache.get(&[1]), Some(Bytes::from_static(b"batch")));
        assert_eq!(cache.get(&[2]), None);
    }

    #[test]
    fn test_put_replaces_in_place() {
        let cache = ModifiableCache::new(1);
        cache.put(vec![1], Bytes::from_static(b"old"));
        cache.put(vec![1], Bytes::from_static(b"new"));
        assert_eq!(cache.get(&[1]), Some(Bytes::from_static(b"new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_a_hard_bound() {
        let cache = ModifiableCache::new(1);
        cache.put(vec![1], Bytes::from_static(b"a"));
        cache.put(vec![2], Bytes::from_static(b"b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&[2]), None, "no eviction: new entry dropped");
    }

    #[test]
    fn test_pass_through_reads_store() {
        let store = Arc::new(Store::in_memory());
        store
            .mutate(&[Mutation::new(Table::History, vec![7], b"frozen".to_vec())])
            .unwrap();

        let cache = PassThroughCache::new(store, Table::History);
        assert_eq!(cache.get(&[7]).unwrap(), Some(Bytes::from_static(b"frozen")));
        assert_eq!(cache.get(&[8]).unwrap(), None);
    }
}
