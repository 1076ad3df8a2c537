//! Embedded key-value storage port backing the encryption substrate.
//!
//! This crate owns exactly one concern: a durable, column-family-oriented
//! key-value engine with atomic batched writes and snapshot-consistent
//! prefix scans. It knows nothing about repositories, commits, or
//! encryption — those live in `dogma-core`, which treats this crate the
//! way the teacher treats its storage-port crate: a narrow trait plus
//! swappable backends.

pub mod error;
pub mod kv;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod rocks;

pub use error::{Result, StorageError};
pub use kv::{KeyValueStore, Snapshot, WriteBatch};
pub use memory::MemoryStore;

#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
