//! Encryption-at-rest substrate (§4.G): envelope encryption over an
//! embedded key-value store, exposed to the rest of the repository
//! engine through the same [`ObjectStore`](crate::features::object_store::ObjectStore)
//! and [`CommitIndex`](crate::features::commit_index::CommitIndex) ports
//! a plaintext deployment uses, so `repo_engine` never needs to know
//! whether a given repository is encrypted.

pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod substrate;

mod commit_index_adapter;
mod object_store_adapter;

pub use commit_index_adapter::EncryptedCommitIndex;
pub use object_store_adapter::EncryptedObjectStore;
pub use ports::KeyManagementService;
pub use substrate::EncryptionSubstrate;
