//! Error types for the embedded key-value storage port.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("column family not found: {0}")]
    NoSuchColumnFamily(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("corrupt record at key {0:?}")]
    Corrupt(Vec<u8>),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(feature = "rocksdb-backend")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
