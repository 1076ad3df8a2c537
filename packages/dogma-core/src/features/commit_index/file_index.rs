use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{info, warn};

use super::{decode_record, encode_record, CommitIndex, RECORD_LEN};
use crate::domain::Revision;
use crate::error::{DogmaError, Result};
use crate::features::object_store::{Hash, ObjectStore};

pub struct FileCommitIndex {
    path: PathBuf,
    // Serializes append/rebuild; reads use their own file handle so they
    // never block on a writer holding this lock for an unrelated commit.
    write_lock: Mutex<()>,
}

impl FileCommitIndex {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            File::create(&path).await?;
        }
        let index = Self {
            path,
            write_lock: Mutex::new(()),
        };
        index.self_check().await?;
        Ok(index)
    }

    /// Safe-mode invariant check (§4.B): file length must be a multiple
    /// of the record size and revisions must be strictly increasing
    /// from 1. A corrupt index is reported, not auto-rebuilt here —
    /// rebuild is an explicit operation the repository engine invokes.
    async fn self_check(&self) -> Result<()> {
        let bytes = tokio::fs::read(&self.path).await?;
        if bytes.len() % RECORD_LEN != 0 {
            warn!(path = %self.path.display(), "commit index length is not record-aligned");
            return Err(DogmaError::Storage(format!(
                "commit index {} has truncated trailing record",
                self.path.display()
            )));
        }
        let mut expected = 1i64;
        for chunk in bytes.chunks_exact(RECORD_LEN) {
            let mut record = [0u8; RECORD_LEN];
            record.copy_from_slice(chunk);
            let (revision, _) = decode_record(&record);
            if revision != expected {
                return Err(DogmaError::Storage(format!(
                    "commit index {} has out-of-order revision {} (expected {})",
                    self.path.display(),
                    revision,
                    expected
                )));
            }
            expected += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl CommitIndex for FileCommitIndex {
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
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(&encode_record(revision.value(), hash)).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn get(&self, revision: Revision) -> Result<Option<Hash>> {
        if revision.value() < 1 {
            return Ok(None);
        }
        let offset = (revision.value() - 1) as u64 * RECORD_LEN as u64;
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if offset + RECORD_LEN as u64 > len {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(offset)).await?;
        let mut record = [0u8; RECORD_LEN];
        file.read_exact(&mut record).await?;
        let (stored_revision, hash) = decode_record(&record);
        if stored_revision != revision.value() {
            return Err(DogmaError::Storage(format!(
                "commit index {} is corrupt: record at revision {} stores revision {}",
                self.path.display(),
                revision.value(),
                stored_revision
            )));
        }
        Ok(Some(hash))
    }

    async fn head(&self) -> Result<Option<Revision>> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(Revision::new((len / RECORD_LEN as u64) as i64)))
    }

    async fn rebuild(&self, head_hash: Hash, object_store: &dyn ObjectStore) -> Result<()> {
        let _guard = self.write_lock.lock();
        info!(path = %self.path.display(), "rebuilding commit index from object store");
        let mut chain = Vec::new();
        let mut cursor = Some(head_hash);
        let mut expected: Option<i64> = None;
        while let Some(hash) = cursor {
            let bytes = object_store.get(hash).await?.ok_or_else(|| {
                DogmaError::Storage(format!("commit object {hash} missing during rebuild"))
            })?;
            let commit = crate::features::object_store::CommitObject::parse(&bytes)
                .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} is corrupt")))?;
            if let Some(expected_revision) = expected {
                if commit.revision != expected_revision {
                    return Err(DogmaError::Storage(format!(
                        "commit index rebuild found revision {} at commit {hash} where {expected_revision} was expected",
                        commit.revision
                    )));
                }
            }
            expected = Some(commit.revision - 1);
            chain.push((commit.revision, hash));
            cursor = commit.parent;
        }
        chain.reverse();
        if let Some((first_revision, first_hash)) = chain.first() {
            if *first_revision != 1 {
                return Err(DogmaError::Storage(format!(
                    "commit index rebuild terminated at revision {first_revision} (commit {first_hash}) instead of revision 1"
                )));
            }
        }

        let mut buf = Vec::with_capacity(chain.len() * RECORD_LEN);
        for (revision, hash) in &chain {
            buf.extend_from_slice(&encode_record(*revision, *hash));
        }
        let tmp = self.path.with_extension("rebuild");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
