//! [`Store`] implementation with Fjall (disk) and in-memory backends.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use bytes::Bytes;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tracing::debug;

use crate::error::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// The keyspaces the balloon writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Frozen history-tree nodes: `[8-byte BE index][2-byte BE height]` → digest.
    History,
    /// Hyper-tree batches below the cache height limit: `[height][index…]` → batch.
    Hyper,
    /// Hyper-tree batches at or above the cache height limit: `[2-byte BE height][index…]` → batch.
    HyperCache,
    /// Event digest → 8-byte BE version of its first occurrence.
    Index,
}

impl Table {
    /// Every table, in keyspace order.
    pub const ALL: [Table; 4] = [Table::History, Table::Hyper, Table::HyperCache, Table::Index];

    fn keyspace_name(&self) -> &'static str {
        match self {
            Table::History => "history",
            Table::Hyper => "hyper",
            Table::HyperCache => "hyper_cache",
            Table::Index => "index",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Table::History => 0,
            Table::Hyper => 1,
            Table::HyperCache => 2,
            Table::Index => 3,
        }
    }
}

/// A single keyed write, staged by the trees and applied by the balloon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Destination table.
    pub table: Table,
    /// Raw key bytes.
    pub key: Vec<u8>,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

impl Mutation {
    /// Create a mutation.
    pub fn new(table: Table, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { table, key, value }
    }
}

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        keyspaces: [Keyspace; 4],
    },
    Memory(Box<MemoryBackend>),
}

/// Pure in-memory storage.
///
/// All tables live under one lock so that [`Store::mutate`] is atomic
/// across tables: readers either see the whole batch or none of it.
struct MemoryBackend {
    tables: RwLock<[BTreeMap<Vec<u8>, Bytes>; 4]>,
}

/// Keyed blob store with ordered range scans and atomic batches.
///
/// Keys are ordered lexicographically on raw bytes. A successful
/// [`mutate`](Store::mutate) is durable on return (Fjall backend) and its
/// writes become visible to subsequent reads all at once.
pub struct Store {
    backend: Backend,
}

impl Store {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_fjall(db)
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_fjall(db)
    }

    /// Create a pure in-memory store. Zero disk I/O.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Box::new(MemoryBackend {
                tables: RwLock::new(std::array::from_fn(|_| BTreeMap::new())),
            })),
        }
    }

    fn init_fjall(db: Database) -> Result<Self> {
        let mut keyspaces = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            keyspaces.push(db.keyspace(table.keyspace_name(), KeyspaceCreateOptions::default)?);
        }
        let keyspaces: [Keyspace; 4] = keyspaces
            .try_into()
            .map_err(|_| StoreError::Unavailable("keyspace setup failed".to_string()))?;
        Ok(Self {
            backend: Backend::Fjall { db, keyspaces },
        })
    }

    /// Retrieve the value stored under `key`, or `None`.
    pub fn get(&self, table: Table, key: &[u8]) -> Result<Option<Bytes>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                let value = keyspaces[table.slot()].get(key)?;
                Ok(value.map(|v| Bytes::from(v.to_vec())))
            }
            Backend::Memory(m) => {
                let tables = m.tables.read().expect("store lock poisoned");
                Ok(tables[table.slot()].get(key).cloned())
            }
        }
    }

    /// Scan `[start, end)` in key-ascending order.
    pub fn get_range(&self, table: Table, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Bytes)>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                let mut result = Vec::new();
                for guard in keyspaces[table.slot()].range(start.to_vec()..end.to_vec()) {
                    let (k, v) = guard.into_inner()?;
                    result.push((k.to_vec(), Bytes::from(v.to_vec())));
                }
                Ok(result)
            }
            Backend::Memory(m) => {
                let tables = m.tables.read().expect("store lock poisoned");
                Ok(tables[table.slot()]
                    .range(start.to_vec()..end.to_vec())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            }
        }
    }

    /// The entry with the greatest key, or `None` for an empty table.
    pub fn get_last(&self, table: Table) -> Result<Option<(Vec<u8>, Bytes)>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                let last = keyspaces[table.slot()].last_key_value();
                match last {
                    Some(guard) => {
                        let (k, v) = guard.into_inner()?;
                        Ok(Some((k.to_vec(), Bytes::from(v.to_vec()))))
                    }
                    None => Ok(None),
                }
            }
            Backend::Memory(m) => {
                let tables = m.tables.read().expect("store lock poisoned");
                Ok(tables[table.slot()]
                    .last_key_value()
                    .map(|(k, v)| (k.clone(), v.clone())))
            }
        }
    }

    /// Apply a batch of mutations atomically: all or none become visible.
    pub fn mutate(&self, mutations: &[Mutation]) -> Result<()> {
        match &self.backend {
            Backend::Fjall { db, keyspaces } => {
                let mut batch = db.batch();
                for m in mutations {
                    batch.insert(&keyspaces[m.table.slot()], m.key.as_slice(), m.value.as_slice());
                }
                batch.commit()?;
            }
            Backend::Memory(m) => {
                let mut tables = m.tables.write().expect("store lock poisoned");
                for mutation in mutations {
                    tables[mutation.table.slot()]
                        .insert(mutation.key.clone(), Bytes::from(mutation.value.clone()));
                }
            }
        }
        debug!(count = mutations.len(), "applied mutation batch");
        Ok(())
    }

    /// Full scan of a table, for bulk export and rebuild tooling.
    pub fn get_all(&self, table: Table) -> Result<Vec<(Vec<u8>, Bytes)>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                let mut result = Vec::new();
                for guard in keyspaces[table.slot()].iter() {
                    let (k, v) = guard.into_inner()?;
                    result.push((k.to_vec(), Bytes::from(v.to_vec())));
                }
                Ok(result)
            }
            Backend::Memory(m) => {
                let tables = m.tables.read().expect("store lock poisoned");
                Ok(tables[table.slot()]
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(key: &[u8], value: &[u8]) -> Mutation {
        Mutation::new(Table::History, key.to_vec(), value.to_vec())
    }

    #[test]
    fn test_get_miss_returns_none() {
        let store = Store::in_memory();
        assert_eq!(store.get(Table::History, b"missing").unwrap(), None);
    }

    #[test]
    fn test_mutate_then_get() {
        let store = Store::in_memory();
        store.mutate(&[kv(b"a", b"1"), kv(b"b", b"2")]).unwrap();
        assert_eq!(store.get(Table::History, b"a").unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(store.get(Table::History, b"b").unwrap(), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn test_tables_are_disjoint() {
        let store = Store::in_memory();
        store
            .mutate(&[Mutation::new(Table::Index, b"k".to_vec(), b"v".to_vec())])
            .unwrap();
        assert_eq!(store.get(Table::History, b"k").unwrap(), None);
        assert_eq!(store.get(Table::Index, b"k").unwrap(), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn test_range_is_half_open_and_ordered() {
        let store = Store::in_memory();
        store
            .mutate(&[kv(b"a", b"1"), kv(b"b", b"2"), kv(b"c", b"3"), kv(b"d", b"4")])
            .unwrap();

        let scanned = store.get_range(Table::History, b"b", b"d").unwrap();
        let keys: Vec<&[u8]> = scanned.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"b".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn test_get_last() {
        let store = Store::in_memory();
        assert!(store.get_last(Table::History).unwrap().is_none());

        store.mutate(&[kv(b"a", b"1"), kv(b"z", b"26"), kv(b"m", b"13")]).unwrap();
        let (key, value) = store.get_last(Table::History).unwrap().unwrap();
        assert_eq!(key, b"z".to_vec());
        assert_eq!(value, Bytes::from_static(b"26"));
    }

    #[test]
    fn test_get_all_returns_every_entry() {
        let store = Store::in_memory();
        store.mutate(&[kv(b"a", b"1"), kv(b"b", b"2")]).unwrap();
        assert_eq!(store.get_all(Table::History).unwrap().len(), 2);
        assert!(store.get_all(Table::Hyper).unwrap().is_empty());
    }

    #[test]
    fn test_fjall_backend_roundtrip() {
        let store = Store::open_temporary().unwrap();
        store
            .mutate(&[
                kv(b"a", b"1"),
                Mutation::new(Table::Hyper, vec![0x04, 0x00], b"batch".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get(Table::History, b"a").unwrap(), Some(Bytes::from_static(b"1")));
        let (key, _) = store.get_last(Table::Hyper).unwrap().unwrap();
        assert_eq!(key, vec![0x04, 0x00]);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let store = Store::in_memory();
        store.mutate(&[kv(b"k", b"old")]).unwrap();
        store.mutate(&[kv(b"k", b"new")]).unwrap();
        assert_eq!(store.get(Table::History, b"k").unwrap(), Some(Bytes::from_static(b"new")));
    }
}
