//! Crate-wide error type.
//!
//! Variant names are the semantic error kinds of the spec (§7); each one
//! carries whatever context (repository, path, revision) is useful for a
//! caller to react without needing a backtrace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DogmaError {
    #[error("revision {revision} not found (head is {head})")]
    RevisionNotFound { revision: i64, head: i64 },

    #[error("entry not found: {path}")]
    EntryNotFound { path: String },

    #[error("change conflict at {path}: {reason}")]
    ChangeConflict { path: String, reason: String },

    #[error("redundant change: push would produce no new tree")]
    RedundantChange,

    #[error("request too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLargeRequest { size: usize, limit: usize },

    #[error("invalid push to {repository}: {reason}")]
    InvalidPush { repository: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("encryption key already exists: {0}")]
    EncryptionEntryExists(String),

    #[error("encryption key absent: {0}")]
    EncryptionEntryAbsent(String),

    #[error("server is read-only")]
    ReadOnly,

    #[error("watch cancelled")]
    Cancelled,

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("repository not found: {0}/{1}")]
    RepositoryNotFound(String, String),

    #[error("project already exists: {0}")]
    ProjectExists(String),

    #[error("repository already exists: {0}/{1}")]
    RepositoryExists(String, String),

    #[error("not the leader")]
    NotLeader,

    #[error("invalid path pattern: {0}")]
    InvalidPathPattern(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, DogmaError>;

impl From<dogma_storage::StorageError> for DogmaError {
    fn from(err: dogma_storage::StorageError) -> Self {
        DogmaError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for DogmaError {
    fn from(err: std::io::Error) -> Self {
        DogmaError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DogmaError {
    fn from(err: serde_json::Error) -> Self {
        DogmaError::Storage(format!("json error: {err}"))
    }
}
