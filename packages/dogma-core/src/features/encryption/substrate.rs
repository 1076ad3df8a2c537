//! The encryption substrate (§4.G): envelope encryption over an embedded
//! key-value store. Every logical object/ref/rev lookup becomes an
//! encrypted key-value read; every write becomes an encrypted put. A
//! per-repository DEK is generated here, wrapped by the KMS, and used
//! (via [`super::domain::EncryptionMetadata`]) to decrypt on read.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes256GcmSiv, Key, Nonce as AesNonce};
use dogma_storage::{KeyValueStore, WriteBatch};
use rand::RngCore;
use tracing::{debug, info};

use super::domain::{
    object_id_metadata_key, object_metadata_key, repository_metadata_prefix, session_master_current_key,
    session_master_key, session_master_salt_key, wdek_current_key, wdek_key, wdek_prefix, Dek,
    EncryptionMetadata, Nonce, DEK_LEN, NONCE_LEN,
};
use super::ports::KeyManagementService;
use crate::error::{DogmaError, Result};
use crate::features::object_store::Hash;

pub const CF_WDEK: &str = "wdek";
pub const CF_METADATA: &str = "encryption_metadata";
pub const CF_OBJECT: &str = "encrypted_object";
pub const CF_OBJECT_ID: &str = "encrypted_object_id";

pub const COLUMN_FAMILIES: [&str; 4] = [CF_WDEK, CF_METADATA, CF_OBJECT, CF_OBJECT_ID];

/// How many metadata/value pairs to delete per write-batch during
/// `delete_repository_data`, per §4.G's "batching writes (e.g. 1000
/// ops/batch) and fsyncing per batch."
const DELETE_BATCH_SIZE: usize = 1000;

pub struct EncryptionSubstrate {
    kv: Arc<dyn KeyValueStore>,
    kms: Arc<dyn KeyManagementService>,
    kek_id: String,
}

impl EncryptionSubstrate {
    pub fn new(kv: Arc<dyn KeyValueStore>, kms: Arc<dyn KeyManagementService>, kek_id: impl Into<String>) -> Self {
        Self { kv, kms, kek_id: kek_id.into() }
    }

    /// Generate a fresh version-1 DEK for a newly created repository,
    /// wrap it, and make it current. A no-op error (`entry-exists`) if
    /// the repository already has a wdek at version 1.
    pub async fn create_repository_dek(&self, project: &str, repo: &str) -> Result<()> {
        let mut dek = [0u8; DEK_LEN];
        rand::thread_rng().fill_bytes(&mut dek);
        self.store_wdek(project, repo, 1, &dek).await?;
        self.set_current_dek_version(project, repo, 1)?;
        info!(project, repo, "repository data encryption key created");
        Ok(())
    }

    pub async fn store_wdek(&self, project: &str, repo: &str, version: u32, dek: &Dek) -> Result<()> {
        let key = wdek_key(project, repo, version);
        if self.kv.contains(CF_WDEK, &key)? {
            return Err(DogmaError::EncryptionEntryExists(format!(
                "wdek already exists for {project}/{repo} version {version}"
            )));
        }
        let wrapped = self.kms.wrap(dek, &self.kek_id).await?;
        let mut batch = WriteBatch::new();
        batch.put(CF_WDEK, key, wrapped);
        self.kv.write(batch, true)?;
        Ok(())
    }

    fn set_current_dek_version(&self, project: &str, repo: &str, version: u32) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(CF_WDEK, wdek_current_key(project, repo), version.to_be_bytes().to_vec());
        self.kv.write(batch, true)
    }

    pub async fn get_dek(&self, project: &str, repo: &str, version: u32) -> Result<Option<Dek>> {
        let key = wdek_key(project, repo, version);
        let Some(wrapped) = self.kv.get(CF_WDEK, &key)? else {
            return Ok(None);
        };
        let unwrapped = self.kms.unwrap(&wrapped, &self.kek_id).await?;
        if unwrapped.len() != DEK_LEN {
            return Err(DogmaError::Storage(format!(
                "unwrapped dek for {project}/{repo} v{version} has unexpected length {}",
                unwrapped.len()
            )));
        }
        let mut dek = [0u8; DEK_LEN];
        dek.copy_from_slice(&unwrapped);
        Ok(Some(dek))
    }

    pub async fn get_current_dek(&self, project: &str, repo: &str) -> Result<Option<(u32, Dek)>> {
        let Some(bytes) = self.kv.get(CF_WDEK, wdek_current_key(project, repo))? else {
            return Ok(None);
        };
        if bytes.len() != 4 {
            return Err(DogmaError::Storage("corrupt current-dek-version pointer".into()));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes);
        let version = u32::from_be_bytes(version_bytes);
        let dek = self
            .get_dek(project, repo, version)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("dek v{version} for {project}/{repo}")))?;
        Ok(Some((version, dek)))
    }

    pub fn remove_wdek(&self, project: &str, repo: &str, version: u32) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(CF_WDEK, wdek_key(project, repo, version));
        self.kv.write(batch, true)
    }

    pub async fn put_object(&self, project: &str, repo: &str, hash: Hash, bytes: &[u8]) -> Result<()> {
        let (version, dek) = self
            .get_current_dek(project, repo)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("no current dek for {project}/{repo}")))?;
        let nonce = random_nonce();
        let ciphertext = aead_encrypt(&dek, &nonce, bytes, hash.as_bytes())?;
        let storage_key = obfuscate(&dek, &nonce, hash.as_bytes())?;
        let metadata_key = object_metadata_key(project, repo, &hash.to_hex());

        let mut batch = WriteBatch::new();
        batch.put(CF_METADATA, metadata_key.into_bytes(), EncryptionMetadata::new(version, nonce).encode());
        batch.put(CF_OBJECT, storage_key, ciphertext);
        self.kv.write(batch, false)?;
        debug!(project, repo, hash = %hash, "encrypted object stored");
        Ok(())
    }

    pub async fn get_object(&self, project: &str, repo: &str, hash: Hash) -> Result<Option<Vec<u8>>> {
        let metadata_key = object_metadata_key(project, repo, &hash.to_hex());
        let Some(meta_bytes) = self.kv.get(CF_METADATA, metadata_key.as_bytes())? else {
            return Ok(None);
        };
        let meta = EncryptionMetadata::decode(&meta_bytes)
            .ok_or_else(|| DogmaError::Storage(format!("corrupt encryption metadata for {metadata_key}")))?;
        let dek = self
            .get_dek(project, repo, meta.version)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("dek v{} for {project}/{repo}", meta.version)))?;
        let storage_key = obfuscate(&dek, &meta.nonce, hash.as_bytes())?;
        let Some(ciphertext) = self.kv.get(CF_OBJECT, &storage_key)? else {
            return Err(DogmaError::Storage(format!(
                "encryption metadata present but object missing for {metadata_key}"
            )));
        };
        let plaintext = aead_decrypt(&dek, &meta.nonce, &ciphertext, hash.as_bytes())?;
        Ok(Some(plaintext))
    }

    pub fn contains_metadata(&self, metadata_key: &str) -> Result<bool> {
        self.kv.contains(CF_METADATA, metadata_key.as_bytes())
    }

    /// The `ref_or_rev` suffixes (with `sub_prefix` stripped) of every
    /// object-id metadata entry under `sub_prefix`, e.g. `"rev2sha/"`
    /// to enumerate an encrypted commit index's known revisions.
    pub fn object_id_suffixes(&self, project: &str, repo: &str, sub_prefix: &str) -> Result<Vec<String>> {
        let full_prefix = object_id_metadata_key(project, repo, sub_prefix);
        let snapshot = self.kv.snapshot();
        let entries = snapshot.prefix_iter(CF_METADATA, full_prefix.as_bytes())?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, _)| {
                let key = String::from_utf8(key).ok()?;
                key.strip_prefix(&full_prefix).map(str::to_string)
            })
            .collect())
    }

    pub async fn put_object_id(&self, project: &str, repo: &str, ref_or_rev: &str, hash: Hash) -> Result<()> {
        let (version, dek) = self
            .get_current_dek(project, repo)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("no current dek for {project}/{repo}")))?;
        let nonce = random_nonce();
        let ciphertext = aead_encrypt(&dek, &nonce, hash.as_bytes(), ref_or_rev.as_bytes())?;
        let storage_key = obfuscate(&dek, &nonce, ref_or_rev.as_bytes())?;
        let metadata_key = object_id_metadata_key(project, repo, ref_or_rev);

        let mut batch = WriteBatch::new();
        batch.put(CF_METADATA, metadata_key.into_bytes(), EncryptionMetadata::new(version, nonce).encode());
        batch.put(CF_OBJECT_ID, storage_key, ciphertext);
        self.kv.write(batch, false)?;
        Ok(())
    }

    pub async fn get_object_id(&self, project: &str, repo: &str, ref_or_rev: &str) -> Result<Option<Hash>> {
        let metadata_key = object_id_metadata_key(project, repo, ref_or_rev);
        let Some(meta_bytes) = self.kv.get(CF_METADATA, metadata_key.as_bytes())? else {
            return Ok(None);
        };
        let meta = EncryptionMetadata::decode(&meta_bytes)
            .ok_or_else(|| DogmaError::Storage(format!("corrupt encryption metadata for {metadata_key}")))?;
        let dek = self
            .get_dek(project, repo, meta.version)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("dek v{} for {project}/{repo}", meta.version)))?;
        let storage_key = obfuscate(&dek, &meta.nonce, ref_or_rev.as_bytes())?;
        let Some(ciphertext) = self.kv.get(CF_OBJECT_ID, &storage_key)? else {
            return Err(DogmaError::Storage(format!(
                "encryption metadata present but object-id value missing for {metadata_key}"
            )));
        };
        let plaintext = aead_decrypt(&dek, &meta.nonce, &ciphertext, ref_or_rev.as_bytes())?;
        if plaintext.len() != 20 {
            return Err(DogmaError::Storage(format!("decrypted object-id for {metadata_key} is not a hash")));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&plaintext);
        Ok(Some(Hash(bytes)))
    }

    pub async fn delete_object_id(&self, project: &str, repo: &str, ref_or_rev: &str) -> Result<()> {
        let metadata_key = object_id_metadata_key(project, repo, ref_or_rev);
        let Some(meta_bytes) = self.kv.get(CF_METADATA, metadata_key.as_bytes())? else {
            return Ok(());
        };
        let meta = EncryptionMetadata::decode(&meta_bytes)
            .ok_or_else(|| DogmaError::Storage(format!("corrupt encryption metadata for {metadata_key}")))?;
        let dek = self
            .get_dek(project, repo, meta.version)
            .await?
            .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("dek v{} for {project}/{repo}", meta.version)))?;
        let storage_key = obfuscate(&dek, &meta.nonce, ref_or_rev.as_bytes())?;

        let mut batch = WriteBatch::new();
        batch.delete(CF_METADATA, metadata_key.into_bytes());
        batch.delete(CF_OBJECT_ID, storage_key);
        self.kv.write(batch, false)
    }

    pub fn get_current_session_key(&self) -> Result<Option<(u32, Vec<u8>)>> {
        let Some(bytes) = self.kv.get(CF_WDEK, session_master_current_key())? else {
            return Ok(None);
        };
        if bytes.len() != 4 {
            return Err(DogmaError::Storage("corrupt session-master-key current pointer".into()));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes);
        let version = u32::from_be_bytes(version_bytes);
        let Some(salt) = self.kv.get(CF_WDEK, session_master_salt_key(version))? else {
            return Ok(None);
        };
        Ok(Some((version, salt)))
    }

    /// Wrap and store a session master key lineage entry (§4.G "session
    /// master key"); `salt` is stored unwrapped alongside it since it is
    /// not itself sensitive, only an input to deriving session keys.
    pub async fn store_session_master_key(&self, version: u32, key_bytes: &[u8], salt: &[u8]) -> Result<()> {
        let wrapped = self.kms.wrap(key_bytes, &self.kek_id).await?;
        let mut batch = WriteBatch::new();
        batch.put(CF_WDEK, session_master_key(version), wrapped);
        batch.put(CF_WDEK, session_master_salt_key(version), salt.to_vec());
        batch.put(CF_WDEK, session_master_current_key(), version.to_be_bytes().to_vec());
        self.kv.write(batch, true)
    }

    /// Delete all metadata/data/wdek entries for a repository, per
    /// §4.G's delete-repository-data algorithm: scan metadata by
    /// prefix, delete the paired encrypted value alongside each
    /// metadata entry in batches, then delete the wdek lineage last.
    pub async fn delete_repository_data(&self, project: &str, repo: &str) -> Result<()> {
        let prefix = repository_metadata_prefix(project, repo);
        let snapshot = self.kv.snapshot();
        let entries = snapshot.prefix_iter(CF_METADATA, prefix.as_bytes())?;

        let mut dek_cache: HashMap<u32, Dek> = HashMap::new();
        let mut batch = WriteBatch::new();
        let mut pending = 0usize;

        for (key_bytes, value_bytes) in entries {
            let key = String::from_utf8_lossy(&key_bytes).into_owned();
            let meta = EncryptionMetadata::decode(&value_bytes)
                .ok_or_else(|| DogmaError::Storage(format!("corrupt encryption metadata for {key}")))?;
            let dek = match dek_cache.get(&meta.version) {
                Some(d) => *d,
                None => {
                    let d = self
                        .get_dek(project, repo, meta.version)
                        .await?
                        .ok_or_else(|| DogmaError::EncryptionEntryAbsent(format!("dek v{} for {project}/{repo}", meta.version)))?;
                    dek_cache.insert(meta.version, d);
                    d
                }
            };

            let suffix = key.strip_prefix(&prefix).unwrap_or(&key);
            let (cf, plaintext) = if let Some(hex_hash) = suffix.strip_prefix("objs/") {
                let hash = Hash::from_hex(hex_hash)
                    .ok_or_else(|| DogmaError::Storage(format!("corrupt object-hash suffix in {key}")))?;
                (CF_OBJECT, hash.as_bytes().to_vec())
            } else {
                (CF_OBJECT_ID, suffix.as_bytes().to_vec())
            };
            let storage_key = obfuscate(&dek, &meta.nonce, &plaintext)?;

            batch.delete(CF_METADATA, key_bytes);
            batch.delete(cf, storage_key);
            pending += 1;

            if pending >= DELETE_BATCH_SIZE {
                self.kv.write(std::mem::take(&mut batch), true)?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.kv.write(batch, true)?;
        }

        let wdek_entries = snapshot.prefix_iter(CF_WDEK, &wdek_prefix(project, repo))?;
        let mut wdek_batch = WriteBatch::new();
        for (key, _) in wdek_entries {
            wdek_batch.delete(CF_WDEK, key);
        }
        wdek_batch.delete(CF_WDEK, wdek_current_key(project, repo));
        self.kv.write(wdek_batch, true)?;

        info!(project, repo, "repository encryption data purged");
        Ok(())
    }
}

fn random_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn aead_encrypt(dek: &Dek, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(dek));
    cipher
        .encrypt(AesNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| DogmaError::Storage(format!("encryption failed: {e}")))
}

fn aead_decrypt(dek: &Dek, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(dek));
    cipher
        .decrypt(AesNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|e| DogmaError::Storage(format!("decryption failed: {e}")))
}

/// Derive the obfuscated storage key a logical value is filed under:
/// `encrypt(dek, nonce, plaintext)`, per §4.G's `encrypted_object`/
/// `encrypted_object_id` key formulas. No nonce reuse concern here
/// beyond GCM-SIV's own misuse resistance — the nonce is random per
/// entry and never reused to encrypt two different logical keys.
fn obfuscate(dek: &Dek, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    aead_encrypt(dek, nonce, plaintext, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encryption::infrastructure::LocalKms;
    use dogma_storage::MemoryStore;

    fn new_substrate() -> EncryptionSubstrate {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(COLUMN_FAMILIES.to_vec()));
        let kms: Arc<dyn KeyManagementService> = Arc::new(LocalKms::new());
        EncryptionSubstrate::new(kv, kms, "kek-1")
    }

    #[tokio::test]
    async fn store_wdek_fails_if_version_already_exists() {
        let sub = new_substrate();
        sub.create_repository_dek("p", "r").await.unwrap();
        let result = sub.store_wdek("p", "r", 1, &[0u8; DEK_LEN]).await;
        assert!(matches!(result, Err(DogmaError::EncryptionEntryExists(_))));
    }

    #[tokio::test]
    async fn object_round_trips_through_encryption() {
        let sub = new_substrate();
        sub.create_repository_dek("p", "r").await.unwrap();
        let hash = Hash::from_bytes(b"hello");
        sub.put_object("p", "r", hash, b"hello world").await.unwrap();
        let fetched = sub.get_object("p", "r", hash).await.unwrap();
        assert_eq!(fetched, Some(b"hello world".to_vec()));
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let sub = new_substrate();
        sub.create_repository_dek("p", "r").await.unwrap();
        let hash = Hash::from_bytes(b"nope");
        assert_eq!(sub.get_object("p", "r", hash).await.unwrap(), None);
    }

    #[tokio::test]
    async fn object_id_round_trips() {
        let sub = new_substrate();
        sub.create_repository_dek("p", "r").await.unwrap();
        let hash = Hash::from_bytes(b"commit-1");
        sub.put_object_id("p", "r", "HEAD", hash).await.unwrap();
        assert_eq!(sub.get_object_id("p", "r", "HEAD").await.unwrap(), Some(hash));
    }

    #[tokio::test]
    async fn delete_repository_data_removes_everything() {
        let sub = new_substrate();
        sub.create_repository_dek("p", "r").await.unwrap();
        for i in 0..10u8 {
            let hash = Hash::from_bytes(&[i]);
            sub.put_object("p", "r", hash, &[i; 4]).await.unwrap();
            sub.put_object_id("p", "r", &format!("rev2sha/{i}"), hash).await.unwrap();
        }
        sub.delete_repository_data("p", "r").await.unwrap();

        for i in 0..10u8 {
            let hash = Hash::from_bytes(&[i]);
            assert_eq!(sub.get_object("p", "r", hash).await.unwrap(), None);
            assert_eq!(sub.get_object_id("p", "r", &format!("rev2sha/{i}")).await.unwrap(), None);
        }
        assert_eq!(sub.get_current_dek("p", "r").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_master_key_round_trips() {
        let sub = new_substrate();
        sub.store_session_master_key(1, b"session-key-bytes", b"salt").await.unwrap();
        let (version, salt) = sub.get_current_session_key().unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(salt, b"salt");
    }
}
