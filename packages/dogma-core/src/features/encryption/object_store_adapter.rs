//! [`ObjectStore`] backed by the encryption substrate, bound to one
//! `(project, repository)` pair. Wraps the substrate rather than any
//! plaintext store: there is no plaintext object store underneath an
//! encrypted repository, only the embedded key-value store.

use async_trait::async_trait;
use std::sync::Arc;

use super::substrate::EncryptionSubstrate;
use crate::error::Result;
use crate::features::object_store::{Hash, ObjectStore};

pub struct EncryptedObjectStore {
    substrate: Arc<EncryptionSubstrate>,
    project: String,
    repository: String,
}

impl EncryptedObjectStore {
    pub fn new(substrate: Arc<EncryptionSubstrate>, project: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            substrate,
            project: project.into(),
            repository: repository.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for EncryptedObjectStore {
    async fn put(&self, hash: Hash, bytes: Vec<u8>) -> Result<()> {
        if self.exists(hash).await? {
            return Ok(());
        }
        self.substrate.put_object(&self.project, &self.repository, hash, &bytes).await
    }

    async fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>> {
        self.substrate.get_object(&self.project, &self.repository, hash).await
    }

    async fn exists(&self, hash: Hash) -> Result<bool> {
        Ok(self.get(hash).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encryption::infrastructure::LocalKms;
    use crate::features::encryption::substrate::COLUMN_FAMILIES;
    use dogma_storage::{KeyValueStore, MemoryStore};

    async fn new_store() -> EncryptedObjectStore {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(COLUMN_FAMILIES.to_vec()));
        let kms = Arc::new(LocalKms::new());
        let substrate = Arc::new(EncryptionSubstrate::new(kv, kms, "kek-1"));
        substrate.create_repository_dek("proj", "repo").await.unwrap();
        EncryptedObjectStore::new(substrate, "proj", "repo")
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = new_store().await;
        let hash = Hash::from_bytes(b"object bytes");
        store.put(hash, b"object bytes".to_vec()).await.unwrap();
        assert_eq!(store.get(hash).await.unwrap(), Some(b"object bytes".to_vec()));
        assert!(store.exists(hash).await.unwrap());
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = new_store().await;
        let hash = Hash::from_bytes(b"twice");
        store.put(hash, b"twice".to_vec()).await.unwrap();
        store.put(hash, b"twice".to_vec()).await.unwrap();
        assert_eq!(store.get(hash).await.unwrap(), Some(b"twice".to_vec()));
    }

    #[tokio::test]
    async fn missing_hash_is_not_found() {
        let store = new_store().await;
        let hash = Hash::from_bytes(b"absent");
        assert!(!store.exists(hash).await.unwrap());
        assert_eq!(store.get(hash).await.unwrap(), None);
    }
}
