//! Project/repository lifecycle and lookup (§[SUPPLEMENT] Project as a
//! first-class container, §4.F's create/remove/purge/unremove
//! commands). Wires each repository's [`RepositoryEngine`] to either a
//! plain filesystem backend or the encryption substrate, depending on
//! [`DogmaConfig::encryption`].

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::DogmaConfig;
use crate::domain::project::{is_reserved_repository, RESERVED_REPOSITORIES};
use crate::domain::repository::validate_name;
use crate::domain::{Author, Project, RepositoryMetadata};
use crate::error::{DogmaError, Result};
use crate::features::cache::QueryCache;
use crate::features::commit_index::{CommitIndex, FileCommitIndex};
use crate::features::encryption::infrastructure::LocalKms;
use crate::features::encryption::substrate::COLUMN_FAMILIES;
use crate::features::encryption::{EncryptedCommitIndex, EncryptedObjectStore, EncryptionSubstrate, KeyManagementService};
use crate::features::object_store::{FilesystemObjectStore, ObjectStore};
use crate::features::repo_engine::RepositoryEngine;
use crate::features::watch::WatchMultiplexer;

use super::domain::{Session, Transformer};

type RepoKey = (String, String);

pub struct RepositoryRegistry {
    config: DogmaConfig,
    substrate: Option<Arc<EncryptionSubstrate>>,
    cache: Arc<QueryCache>,
    projects: DashMap<String, Project>,
    repo_meta: DashMap<RepoKey, RepositoryMetadata>,
    engines: DashMap<RepoKey, Arc<RepositoryEngine>>,
    sessions: DashMap<String, Session>,
    transformers: DashMap<String, Arc<dyn Transformer>>,
}

impl RepositoryRegistry {
    pub async fn new(config: DogmaConfig) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(config.data_dir.join("projects")).await?;

        let substrate = if config.encryption.enabled {
            let kv_path = config.data_dir.join(&config.encryption.kv_store_dir);
            let kv: Arc<dyn dogma_storage::KeyValueStore> =
                Arc::new(dogma_storage::RocksStore::open(kv_path, COLUMN_FAMILIES.to_vec())?);
            let kms: Arc<dyn KeyManagementService> = Arc::new(LocalKms::new());
            Some(Arc::new(EncryptionSubstrate::new(kv, kms, config.encryption.kek_id.clone())))
        } else {
            None
        };

        let cache = Arc::new(QueryCache::new(config.cache.max_weight_bytes));

        Ok(Self {
            config,
            substrate,
            cache,
            projects: DashMap::new(),
            repo_meta: DashMap::new(),
            engines: DashMap::new(),
            sessions: DashMap::new(),
            transformers: DashMap::new(),
        })
    }

    pub fn register_transformer(&self, name: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.transformers.insert(name.into(), transformer);
    }

    pub fn transformer(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(name).map(|e| e.value().clone())
    }

    fn repo_dir(&self, project: &str, repo: &str) -> PathBuf {
        self.config.data_dir.join("projects").join(project).join(repo)
    }

    pub fn project(&self, name: &str) -> Result<Project> {
        self.projects
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| DogmaError::ProjectNotFound(name.to_string()))
    }

    pub async fn create_project(&self, author: Author, name: &str) -> Result<()> {
        if self.projects.contains_key(name) {
            return Err(DogmaError::ProjectExists(name.to_string()));
        }
        self.projects.insert(name.to_string(), Project::new(name, author.clone()));
        for reserved in RESERVED_REPOSITORIES {
            self.create_repository_internal(author.clone(), name, reserved).await?;
        }
        info!(project = name, "project created");
        Ok(())
    }

    pub fn remove_project(&self, name: &str) -> Result<()> {
        let mut entry = self.projects.get_mut(name).ok_or_else(|| DogmaError::ProjectNotFound(name.to_string()))?;
        entry.removed_at = Some(chrono::Utc::now());
        Ok(())
    }

    pub fn unremove_project(&self, name: &str) -> Result<()> {
        let mut entry = self.projects.get_mut(name).ok_or_else(|| DogmaError::ProjectNotFound(name.to_string()))?;
        entry.removed_at = None;
        Ok(())
    }

    pub async fn purge_project(&self, name: &str) -> Result<()> {
        if !self.projects.contains_key(name) {
            return Err(DogmaError::ProjectNotFound(name.to_string()));
        }
        let repo_names: Vec<String> = self
            .repo_meta
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| e.key().1.clone())
            .collect();
        for repo in repo_names {
            self.purge_repository(name, &repo).await?;
        }
        self.projects.remove(name);
        info!(project = name, "project purged");
        Ok(())
    }

    async fn create_repository_internal(&self, author: Author, project: &str, name: &str) -> Result<RepositoryMetadata> {
        let key = (project.to_string(), name.to_string());
        if self.repo_meta.contains_key(&key) {
            return Err(DogmaError::RepositoryExists(project.to_string(), name.to_string()));
        }
        if !validate_name(name) {
            return Err(DogmaError::InvalidPush {
                repository: format!("{project}/{name}"),
                reason: "invalid repository name".into(),
            });
        }

        let watch_mux = Arc::new(WatchMultiplexer::new());
        let engine = if let Some(substrate) = &self.substrate {
            substrate.create_repository_dek(project, name).await?;
            let store: Arc<dyn ObjectStore> = Arc::new(EncryptedObjectStore::new(substrate.clone(), project, name));
            let index: Arc<dyn CommitIndex> = Arc::new(EncryptedCommitIndex::new(substrate.clone(), project, name));
            RepositoryEngine::new(project, name, store, index, watch_mux, self.cache.clone(), self.config.max_commit_payload_bytes)
        } else {
            let dir = self.repo_dir(project, name);
            let store: Arc<dyn ObjectStore> = Arc::new(FilesystemObjectStore::open(&dir).await?);
            let index: Arc<dyn CommitIndex> = Arc::new(FileCommitIndex::open(dir.join("commit_ids.dat")).await?);
            RepositoryEngine::new(project, name, store, index, watch_mux, self.cache.clone(), self.config.max_commit_payload_bytes)
        };
        engine.initialize(author.clone()).await?;

        let metadata = RepositoryMetadata::new(project, name, author);
        if self.substrate.is_none() {
            let dir = self.repo_dir(project, name);
            let bytes = serde_json::to_vec_pretty(&metadata)?;
            tokio::fs::write(dir.join("repository.json"), bytes).await?;
        }

        self.repo_meta.insert(key.clone(), metadata.clone());
        self.engines.insert(key, Arc::new(engine));
        info!(project, repository = name, "repository created");
        Ok(metadata)
    }

    pub async fn create_repository(&self, author: Author, project: &str, name: &str) -> Result<RepositoryMetadata> {
        if is_reserved_repository(name) {
            return Err(DogmaError::InvalidPush {
                repository: format!("{project}/{name}"),
                reason: "repository name is reserved".into(),
            });
        }
        let _ = self.project(project)?;
        self.create_repository_internal(author, project, name).await
    }

    pub fn remove_repository(&self, project: &str, name: &str) -> Result<()> {
        let mut entry = self
            .repo_meta
            .get_mut(&(project.to_string(), name.to_string()))
            .ok_or_else(|| DogmaError::RepositoryNotFound(project.to_string(), name.to_string()))?;
        entry.removed_at = Some(chrono::Utc::now());
        Ok(())
    }

    pub fn unremove_repository(&self, project: &str, name: &str) -> Result<()> {
        let mut entry = self
            .repo_meta
            .get_mut(&(project.to_string(), name.to_string()))
            .ok_or_else(|| DogmaError::RepositoryNotFound(project.to_string(), name.to_string()))?;
        entry.removed_at = None;
        Ok(())
    }

    pub async fn purge_repository(&self, project: &str, name: &str) -> Result<()> {
        let key = (project.to_string(), name.to_string());
        if !self.repo_meta.contains_key(&key) {
            return Err(DogmaError::RepositoryNotFound(project.to_string(), name.to_string()));
        }
        self.engines.remove(&key);
        if let Some(substrate) = &self.substrate {
            substrate.delete_repository_data(project, name).await?;
        } else {
            let dir = self.repo_dir(project, name);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.repo_meta.remove(&key);
        info!(project, repository = name, "repository purged");
        Ok(())
    }

    /// The engine for an existing, non-removed repository. Removed
    /// repositories are retained on disk but refuse lookups here,
    /// matching §3's soft-delete lifecycle.
    pub fn active_engine(&self, project: &str, name: &str) -> Result<Arc<RepositoryEngine>> {
        let key = (project.to_string(), name.to_string());
        let meta = self
            .repo_meta
            .get(&key)
            .ok_or_else(|| DogmaError::RepositoryNotFound(project.to_string(), name.to_string()))?;
        if meta.is_removed() {
            return Err(DogmaError::RepositoryNotFound(project.to_string(), name.to_string()));
        }
        drop(meta);
        self.engines
            .get(&key)
            .map(|e| e.value().clone())
            .ok_or_else(|| DogmaError::RepositoryNotFound(project.to_string(), name.to_string()))
    }

    pub fn repository_metadata(&self, project: &str, name: &str) -> Result<RepositoryMetadata> {
        self.repo_meta
            .get(&(project.to_string(), name.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| DogmaError::RepositoryNotFound(project.to_string(), name.to_string()))
    }

    pub fn create_session(&self, session_id: impl Into<String>, user: impl Into<String>, ttl_secs: u64) {
        let session_id = session_id.into();
        self.sessions.insert(session_id.clone(), Session::new(session_id, user, ttl_secs));
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_registry() -> (RepositoryRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DogmaConfig::default();
        config.data_dir = dir.path().to_path_buf();
        (RepositoryRegistry::new(config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn create_project_provisions_reserved_repositories() {
        let (registry, _dir) = new_registry().await;
        registry.create_project(Author::system(), "proj").await.unwrap();
        assert!(registry.active_engine("proj", "dogma").is_ok());
        assert!(registry.active_engine("proj", "meta").is_ok());
    }

    #[tokio::test]
    async fn create_repository_rejects_reserved_names() {
        let (registry, _dir) = new_registry().await;
        registry.create_project(Author::system(), "proj").await.unwrap();
        let result = registry.create_repository(Author::system(), "proj", "dogma").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn removed_repository_is_hidden_until_unremoved() {
        let (registry, _dir) = new_registry().await;
        registry.create_project(Author::system(), "proj").await.unwrap();
        registry.create_repository(Author::system(), "proj", "app").await.unwrap();

        registry.remove_repository("proj", "app").unwrap();
        assert!(registry.active_engine("proj", "app").is_err());

        registry.unremove_repository("proj", "app").unwrap();
        assert!(registry.active_engine("proj", "app").is_ok());
    }

    #[tokio::test]
    async fn purge_repository_removes_it_permanently() {
        let (registry, _dir) = new_registry().await;
        registry.create_project(Author::system(), "proj").await.unwrap();
        registry.create_repository(Author::system(), "proj", "app").await.unwrap();

        registry.purge_repository("proj", "app").await.unwrap();
        assert!(registry.active_engine("proj", "app").is_err());
        assert!(registry.repository_metadata("proj", "app").is_err());
    }

    #[tokio::test]
    async fn purge_project_purges_every_repository() {
        let (registry, _dir) = new_registry().await;
        registry.create_project(Author::system(), "proj").await.unwrap();
        registry.create_repository(Author::system(), "proj", "app").await.unwrap();

        registry.purge_project("proj").await.unwrap();
        assert!(registry.project("proj").is_err());
        assert!(registry.active_engine("proj", "app").is_err());
        assert!(registry.active_engine("proj", "dogma").is_err());
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        let (registry, _dir) = new_registry().await;
        registry.create_session("s1", "alice", 3600);
        assert_eq!(registry.session("s1").unwrap().user, "alice");
        registry.remove_session("s1");
        assert!(registry.session("s1").is_none());
    }
}
