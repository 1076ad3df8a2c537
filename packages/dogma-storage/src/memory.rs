//! In-memory [`KeyValueStore`], used by tests and by embedders that don't
//! need persistence (mirrors the teacher's in-memory storage backend used
//! alongside its durable one).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, StorageError};
use crate::kv::{BatchOp, KeyValueStore, Snapshot, WriteBatch};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
pub struct MemoryStore {
    column_families: Vec<&'static str>,
    tables: Arc<RwLock<std::collections::HashMap<&'static str, Table>>>,
}

impl MemoryStore {
    pub fn new(column_families: Vec<&'static str>) -> Self {
        let mut tables = std::collections::HashMap::new();
        for cf in &column_families {
            tables.insert(*cf, Table::new());
        }
        Self {
            column_families,
            tables: Arc::new(RwLock::new(tables)),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read().unwrap();
        let table = tables
            .get(cf)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(cf.to_string()))?;
        Ok(table.get(key).cloned())
    }

    fn write(&self, batch: WriteBatch, _sync: bool) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        for op in &batch.ops {
            let cf = match op {
                BatchOp::Put { cf, .. } | BatchOp::Delete { cf, .. } => *cf,
            };
            if !tables.contains_key(cf) {
                return Err(StorageError::NoSuchColumnFamily(cf.to_string()));
            }
        }
        for op in batch.ops {
            match op {
                BatchOp::Put { cf, key, value } => {
                    tables.get_mut(cf).unwrap().insert(key, value);
                }
                BatchOp::Delete { cf, key } => {
                    tables.get_mut(cf).unwrap().remove(&key);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn Snapshot> {
        let tables = self.tables.read().unwrap();
        Box::new(MemorySnapshot {
            tables: tables.clone(),
        })
    }

    fn column_families(&self) -> &[&'static str] {
        &self.column_families
    }
}

struct MemorySnapshot {
    tables: std::collections::HashMap<&'static str, Table>,
}

impl Snapshot for MemorySnapshot {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self
            .tables
            .get(cf)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(cf.to_string()))?;
        Ok(table.get(key).cloned())
    }

    fn prefix_iter(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let table = self
            .tables
            .get(cf)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(cf.to_string()))?;
        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_batch_is_atomic_across_ops() {
        let store = MemoryStore::new(vec!["cf"]);
        let mut batch = WriteBatch::new();
        batch.put("cf", b"a".to_vec(), b"1".to_vec());
        batch.put("cf", b"b".to_vec(), b"2".to_vec());
        store.write(batch, false).unwrap();

        assert_eq!(store.get("cf", b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("cf", b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let store = MemoryStore::new(vec!["cf"]);
        store.put("cf", b"a".to_vec(), b"1".to_vec()).unwrap();
        store.delete("cf", b"a".to_vec()).unwrap();
        assert_eq!(store.get("cf", b"a").unwrap(), None);
    }

    #[test]
    fn unknown_column_family_errors() {
        let store = MemoryStore::new(vec!["cf"]);
        assert!(store.get("nope", b"a").is_err());
    }

    #[test]
    fn prefix_iter_respects_prefix_boundary() {
        let store = MemoryStore::new(vec!["cf"]);
        store.put("cf", b"p/1".to_vec(), b"x".to_vec()).unwrap();
        store.put("cf", b"q/1".to_vec(), b"y".to_vec()).unwrap();
        let snap = store.snapshot();
        let found = snap.prefix_iter("cf", b"p/").unwrap();
        assert_eq!(found, vec![(b"p/1".to_vec(), b"x".to_vec())]);
    }
}
