//! Content-addressed object store (§4.A).
//!
//! ```text
//! ports::ObjectStore  (primary port, consumed by repo_engine)
//!         ↑
//! infrastructure::FilesystemObjectStore   (plain, on-disk)
//! features::encryption::EncryptedObjectStore   (wraps any ObjectStore)
//! ```

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{Blob, CommitObject, EntryMode, Hash, ObjectKind, Tree, TreeEntry};
pub use infrastructure::FilesystemObjectStore;
pub use ports::ObjectStore;
