//! Filesystem-backed object store: objects live at
//! `<root>/objs/<hash-hex>`, matching the persisted-state layout's
//! `project/repo/objs/<hash>` convention (§6).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::super::domain::Hash;
use super::super::ports::ObjectStore;
use crate::error::Result;

pub struct FilesystemObjectStore {
    objs_dir: PathBuf,
}

impl FilesystemObjectStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let objs_dir = root.as_ref().join("objs");
        fs::create_dir_all(&objs_dir).await?;
        Ok(Self { objs_dir })
    }

    fn path_for(&self, hash: Hash) -> PathBuf {
        let hex = hash.to_hex();
        // Two-char fan-out directory avoids a single huge flat directory.
        self.objs_dir.join(&hex[0..2]).join(&hex[2..])
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, hash: Hash, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(hash);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(hash = %hash, bytes = bytes.len(), "object written");
        Ok(())
    }

    async fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(hash)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, hash: Hash) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(hash)).await.unwrap_or(false))
    }
}
