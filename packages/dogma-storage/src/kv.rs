//! Embedded key-value store port.
//!
//! Mirrors the external collaborator interface of spec §6: column
//! families, an atomic write-batch with an optional fsync, and a
//! prefix-iterator taken against a point-in-time snapshot.

use crate::error::Result;

/// A single mutation inside a [`WriteBatch`].
pub enum BatchOp {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

/// An ordered set of mutations applied atomically by [`KeyValueStore::write`].
#[derive(Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cf: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            cf,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, cf: &'static str, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete {
            cf,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }
}

/// A point-in-time view of the store, used so a prefix scan observes a
/// consistent snapshot even while concurrent writers are batching changes.
pub trait Snapshot: Send + Sync {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All `(key, value)` pairs in `cf` whose key starts with `prefix`,
    /// ordered by key.
    fn prefix_iter(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// The embedded key-value engine backing the encryption substrate (§4.G)
/// and, indirectly, any other component that wants a durable map on disk.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn contains(&self, cf: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Apply `batch` atomically. When `sync` is set the write is fsynced
    /// before returning, matching the `store_*` contract of §4.G which
    /// requires every wrapped-key write to be durable before the caller
    /// proceeds.
    fn write(&self, batch: WriteBatch, sync: bool) -> Result<()>;

    fn put(&self, cf: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()>
    where
        Self: Sized,
    {
        let mut batch = WriteBatch::new();
        batch.put(cf, key, value);
        self.write(batch, true)
    }

    fn delete(&self, cf: &'static str, key: impl Into<Vec<u8>>) -> Result<()>
    where
        Self: Sized,
    {
        let mut batch = WriteBatch::new();
        batch.delete(cf, key);
        self.write(batch, true)
    }

    fn snapshot(&self) -> Box<dyn Snapshot>;

    /// All column families this engine was opened with.
    fn column_families(&self) -> &[&'static str];
}
