//! Commit-id index (§4.B): a fixed-record file mapping revision number
//! to commit hash, giving O(1) lookup without walking the object store.
//!
//! Each record is 24 bytes: a 4-byte big-endian revision number followed
//! by the 20-byte commit hash. Revision `r`'s record lives at byte offset
//! `(r - 1) * 24`, so `get` is a single seek + read.

mod file_index;

pub use file_index::FileCommitIndex;

use async_trait::async_trait;

use crate::domain::Revision;
use crate::error::Result;
use crate::features::object_store::Hash;

pub const RECORD_LEN: usize = 24;

#[async_trait]
pub trait CommitIndex: Send + Sync {
    /// Append the record for `revision`, which must equal `head() + 1`
    /// (or 1 if the index is empty). Returns `change-conflict`-shaped
    /// error semantics are the caller's concern; this trait only
    /// enforces the monotonic-append invariant.
    async fn put(&self, revision: Revision, hash: Hash) -> Result<()>;

    async fn get(&self, revision: Revision) -> Result<Option<Hash>>;

    /// The highest revision with a record, or `None` for an empty index.
    async fn head(&self) -> Result<Option<Revision>>;

    /// Rebuild the index from scratch by walking the commit object
    /// chain backward from `head_hash`, used when the index file is
    /// missing, truncated, or fails its self-check on open.
    async fn rebuild(
        &self,
        head_hash: Hash,
        object_store: &dyn crate::features::object_store::ObjectStore,
    ) -> Result<()>;
}

pub fn encode_record(revision: i64, hash: Hash) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    buf[0..4].copy_from_slice(&(revision as u32).to_be_bytes());
    buf[4..24].copy_from_slice(hash.as_bytes());
    buf
}

pub fn decode_record(buf: &[u8; RECORD_LEN]) -> (i64, Hash) {
    let mut rev_bytes = [0u8; 4];
    rev_bytes.copy_from_slice(&buf[0..4]);
    let revision = u32::from_be_bytes(rev_bytes) as i64;
    let mut hash_bytes = [0u8; 20];
    hash_bytes.copy_from_slice(&buf[4..24]);
    (revision, Hash(hash_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips() {
        let hash = Hash::from_bytes(b"abc");
        let record = encode_record(7, hash);
        assert_eq!(decode_record(&record), (7, hash));
    }
}
