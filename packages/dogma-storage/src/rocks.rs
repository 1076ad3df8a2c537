//! RocksDB-backed [`KeyValueStore`].

use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch as RocksWriteBatch, DB};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::kv::{BatchOp, KeyValueStore, Snapshot, WriteBatch};

pub struct RocksStore {
    db: Arc<DB>,
    column_families: Vec<&'static str>,
}

impl RocksStore {
    /// Open (creating if absent) a RocksDB instance with exactly the
    /// requested column families.
    pub fn open(path: impl AsRef<Path>, column_families: Vec<&'static str>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = column_families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        debug!(?column_families, "opened rocksdb store");

        Ok(Self {
            db: Arc::new(db),
            column_families,
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(name.to_string()))
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let handle = self.cf(cf)?;
        Ok(self.db.get_cf(&handle, key)?)
    }

    fn write(&self, batch: WriteBatch, sync: bool) -> Result<()> {
        let mut rocks_batch = RocksWriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { cf, key, value } => {
                    let handle = self.cf(cf)?;
                    rocks_batch.put_cf(&handle, key, value);
                }
                BatchOp::Delete { cf, key } => {
                    let handle = self.cf(cf)?;
                    rocks_batch.delete_cf(&handle, key);
                }
            }
        }

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(sync);
        self.db.write_opt(rocks_batch, &write_opts)?;
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn Snapshot> {
        Box::new(RocksSnapshot::new(self.db.clone()))
    }

    fn column_families(&self) -> &[&'static str] {
        &self.column_families
    }
}

/// Snapshot backed by RocksDB's own MVCC snapshot, taken once at
/// construction and reused for every `get`/`prefix_iter` call, so two
/// scans through the same `RocksSnapshot` see the same point-in-time
/// view even while concurrent writers keep batching changes into `db`.
struct RocksSnapshot {
    // Keeps the database alive for as long as `snapshot` borrows it.
    // Declared after `snapshot` so it's dropped after (field drop order
    // is declaration order), though `RocksStore` itself also holds an
    // `Arc<DB>` for the database's whole lifetime regardless.
    snapshot: rocksdb::Snapshot<'static>,
    db: Arc<DB>,
}

impl RocksSnapshot {
    fn new(db: Arc<DB>) -> Self {
        let snapshot = db.snapshot();
        // SAFETY: `snapshot` borrows `*db`. `db` is an `Arc<DB>` whose
        // heap allocation does not move, and this struct holds a clone
        // of that `Arc` for its own lifetime, so the borrow stays valid
        // for as long as the transmuted `'static` snapshot is held here.
        let snapshot: rocksdb::Snapshot<'static> = unsafe { std::mem::transmute(snapshot) };
        Self { snapshot, db }
    }
}

impl Snapshot for RocksSnapshot {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(cf.to_string()))?;
        Ok(self.snapshot.get_cf(&handle, key)?)
    }

    fn prefix_iter(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::NoSuchColumnFamily(cf.to_string()))?;
        let mut out = Vec::new();
        let iter = self.snapshot.iterator_cf(
            &handle,
            rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path(), vec!["cf1"]).unwrap();
        store.put("cf1", b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(store.get("cf1", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path(), vec!["cf1"]).unwrap();
        store.put("cf1", b"a/1".to_vec(), b"1".to_vec()).unwrap();
        store.put("cf1", b"a/2".to_vec(), b"2".to_vec()).unwrap();
        store.put("cf1", b"b/1".to_vec(), b"3".to_vec()).unwrap();

        let snap = store.snapshot();
        let found = snap.prefix_iter("cf1", b"a/").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, b"a/1");
        assert_eq!(found[1].0, b"a/2");
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path(), vec!["cf1"]).unwrap();
        assert_eq!(store.get("cf1", b"missing").unwrap(), None);
    }
}
