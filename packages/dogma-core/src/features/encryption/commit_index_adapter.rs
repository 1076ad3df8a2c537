//! [`CommitIndex`] backed by the encryption substrate, bound to one
//! `(project, repository)` pair. Revision-to-hash records live as
//! object-id entries under `rev2sha/<revision>`, per §4.G's literal
//! key layout; `head` is the maximum revision found under that prefix
//! rather than a separately tracked counter, so it stays consistent
//! with whatever `put`/`delete_repository_data` have actually done.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::substrate::EncryptionSubstrate;
use crate::domain::Revision;
use crate::error::{DogmaError, Result};
use crate::features::commit_index::CommitIndex;
use crate::features::object_store::{Hash, ObjectStore};

const REV_SUB_PREFIX: &str = "rev2sha/";

pub struct EncryptedCommitIndex {
    substrate: Arc<EncryptionSubstrate>,
    project: String,
    repository: String,
    // Serializes append so the "must equal head()+1" check and the
    // write it guards can't race across concurrent commits.
    write_lock: Mutex<()>,
}

impl EncryptedCommitIndex {
    pub fn new(substrate: Arc<EncryptionSubstrate>, project: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            substrate,
            project: project.into(),
            repository: repository.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn rev_key(revision: i64) -> String {
        format!("{REV_SUB_PREFIX}{revision}")
    }
}

#[async_trait]
impl CommitIndex for EncryptedCommitIndex {
    async fn put(&self, revision: Revision, hash: Hash) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current_head = self.head().await?;
        let expected = current_head.map(|r| r.value() + 1).unwrap_or(1);
        if revision.value() != expected {
            return Err(DogmaError::Storage(format!(
                "commit index append out of order: got {}, expected {}",
                revision.value(),
                expected
            )));
        }
        self.substrate
            .put_object_id(&self.project, &self.repository, &Self::rev_key(revision.value()), hash)
            .await
    }

    async fn get(&self, revision: Revision) -> Result<Option<Hash>> {
        if revision.value() < 1 {
            return Ok(None);
        }
        self.substrate
            .get_object_id(&self.project, &self.repository, &Self::rev_key(revision.value()))
            .await
    }

    async fn head(&self) -> Result<Option<Revision>> {
        let suffixes = self.substrate.object_id_suffixes(&self.project, &self.repository, REV_SUB_PREFIX)?;
        let max = suffixes.iter().filter_map(|s| s.parse::<i64>().ok()).max();
        Ok(max.map(Revision::new))
    }

    async fn rebuild(&self, head_hash: Hash, object_store: &dyn ObjectStore) -> Result<()> {
        let _guard = self.write_lock.lock();
        info!(project = %self.project, repository = %self.repository, "rebuilding encrypted commit index from object store");
        let mut chain = Vec::new();
        let mut cursor = Some(head_hash);
        while let Some(hash) = cursor {
            let bytes = object_store
                .get(hash)
                .await?
                .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} missing during rebuild")))?;
            let commit = crate::features::object_store::CommitObject::parse(&bytes)
                .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} is corrupt")))?;
            chain.push((commit.revision, hash));
            cursor = commit.parent;
        }
        for (revision, hash) in chain {
            self.substrate
                .put_object_id(&self.project, &self.repository, &Self::rev_key(revision), hash)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encryption::infrastructure::LocalKms;
    use crate::features::encryption::substrate::COLUMN_FAMILIES;
    use dogma_storage::{KeyValueStore, MemoryStore};

    async fn new_index() -> EncryptedCommitIndex {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(COLUMN_FAMILIES.to_vec()));
        let kms = Arc::new(LocalKms::new());
        let substrate = Arc::new(EncryptionSubstrate::new(kv, kms, "kek-1"));
        substrate.create_repository_dek("proj", "repo").await.unwrap();
        EncryptedCommitIndex::new(substrate, "proj", "repo")
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let index = new_index().await;
        let hash = Hash::from_bytes(b"c1");
        index.put(Revision::new(1), hash).await.unwrap();
        assert_eq!(index.get(Revision::new(1)).await.unwrap(), Some(hash));
        assert_eq!(index.head().await.unwrap(), Some(Revision::new(1)));
    }

    #[tokio::test]
    async fn out_of_order_append_is_rejected() {
        let index = new_index().await;
        let result = index.put(Revision::new(2), Hash::from_bytes(b"skip")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_revision_returns_none() {
        let index = new_index().await;
        assert_eq!(index.get(Revision::new(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn head_tracks_highest_appended_revision() {
        let index = new_index().await;
        index.put(Revision::new(1), Hash::from_bytes(b"c1")).await.unwrap();
        index.put(Revision::new(2), Hash::from_bytes(b"c2")).await.unwrap();
        index.put(Revision::new(3), Hash::from_bytes(b"c3")).await.unwrap();
        assert_eq!(index.head().await.unwrap(), Some(Revision::new(3)));
    }
}
