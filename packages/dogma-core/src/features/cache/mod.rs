//! Query / merge cache (§4.D): a concurrent bounded-weight map over the
//! seven cacheable call types, with at-most-one-inflight computation per
//! key via `moka`'s async-loading entry API.

mod keys;

pub use keys::{CacheKey, RepoId};

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::domain::{Entry, Revision};
use crate::error::{DogmaError, Result};
use crate::features::repo_engine::{DiffEntry, HistoryEntry};

#[derive(Debug, Clone)]
pub enum CachedValue {
    Find(Arc<Vec<Entry>>),
    Get(Arc<Entry>),
    History(Arc<Vec<HistoryEntry>>),
    Diff(Arc<Vec<DiffEntry>>),
    FindLatestRevision(Option<Revision>),
    MergeFiles(Arc<Value>),
}

fn entry_weight(entry: &Entry) -> usize {
    entry.path.len()
        + match entry.canonical_bytes() {
            Some(bytes) => bytes.len(),
            None => 0,
        }
}

fn diff_entry_weight(entry: &DiffEntry) -> usize {
    let content_weight = |content: &crate::features::repo_engine::DiffContent| match content {
        crate::features::repo_engine::DiffContent::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
        crate::features::repo_engine::DiffContent::Text(s) => s.len(),
    };
    entry.path().len()
        + match entry {
            DiffEntry::Add { content, .. } => content_weight(content),
            DiffEntry::Modify { patch, .. } => content_weight(patch),
            DiffEntry::Remove { .. } => 0,
            DiffEntry::Rename { destination, .. } => destination.len(),
        }
}

fn weigh(_key: &CacheKey, value: &CachedValue) -> u32 {
    let bytes: usize = match value {
        CachedValue::Find(entries) => entries.iter().map(entry_weight).sum(),
        CachedValue::Get(entry) => entry_weight(entry),
        CachedValue::History(history) => history
            .iter()
            .map(|h| {
                h.commit.message.summary.len()
                    + h.commit.message.detail.len()
                    + h.touched_paths.iter().map(|p| p.len()).sum::<usize>()
            })
            .sum(),
        CachedValue::Diff(diff) => diff.iter().map(diff_entry_weight).sum(),
        CachedValue::FindLatestRevision(_) => 8,
        CachedValue::MergeFiles(value) => serde_json::to_vec(value.as_ref()).map(|b| b.len()).unwrap_or(0),
    };
    bytes.min(u32::MAX as usize) as u32
}

/// Weight-bounded, at-most-one-inflight-per-key memoization over the
/// seven cacheable repository-engine calls.
pub struct QueryCache {
    inner: moka::future::Cache<CacheKey, CachedValue>,
}

impl QueryCache {
    pub fn new(max_weight: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .weigher(weigh)
            .max_capacity(max_weight)
            .build();
        Self { inner }
    }

    pub fn weighted_size(&self) -> u64 {
        self.inner.weighted_size()
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
    }

    /// Invalidate every cached call for `repo` — used after a commit
    /// publishes a new revision, before watchers are notified, so a
    /// watcher's subsequent read observes at least the new revision.
    pub async fn invalidate_repository(&self, repo: &RepoId) {
        let repo = repo.clone();
        self.inner.invalidate_entries_if(move |key, _| key_repo(key) == &repo).ok();
        self.inner.run_pending_tasks().await;
    }

    async fn load(&self, key: CacheKey, init: impl Future<Output = Result<CachedValue>> + Send) -> Result<CachedValue> {
        self.inner.try_get_with(key, init).await.map_err(|e| {
            trace!("cache load failed: {e}");
            DogmaError::Storage(e.to_string())
        })
    }

    /// Two-phase insert for calls (`get`, `merge-files`) whose value may
    /// have been produced outside the cache's own execution path.
    pub async fn insert(&self, key: CacheKey, value: CachedValue) {
        self.inner.insert(key, value).await;
    }

    pub async fn get_find<F>(&self, key: CacheKey, init: F) -> Result<Arc<Vec<Entry>>>
    where
        F: Future<Output = Result<Vec<Entry>>> + Send,
    {
        match self.load(key, async move { init.await.map(|v| CachedValue::Find(Arc::new(v))) }).await? {
            CachedValue::Find(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }

    pub async fn get_get<F>(&self, key: CacheKey, init: F) -> Result<Arc<Entry>>
    where
        F: Future<Output = Result<Entry>> + Send,
    {
        match self.load(key, async move { init.await.map(|v| CachedValue::Get(Arc::new(v))) }).await? {
            CachedValue::Get(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }

    pub async fn get_history<F>(&self, key: CacheKey, init: F) -> Result<Arc<Vec<HistoryEntry>>>
    where
        F: Future<Output = Result<Vec<HistoryEntry>>> + Send,
    {
        match self.load(key, async move { init.await.map(|v| CachedValue::History(Arc::new(v))) }).await? {
            CachedValue::History(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }

    pub async fn get_diff<F>(&self, key: CacheKey, init: F) -> Result<Arc<Vec<DiffEntry>>>
    where
        F: Future<Output = Result<Vec<DiffEntry>>> + Send,
    {
        match self.load(key, async move { init.await.map(|v| CachedValue::Diff(Arc::new(v))) }).await? {
            CachedValue::Diff(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }

    pub async fn get_find_latest_revision<F>(&self, key: CacheKey, init: F) -> Result<Option<Revision>>
    where
        F: Future<Output = Result<Option<Revision>>> + Send,
    {
        match self.load(key, async move { init.await.map(CachedValue::FindLatestRevision) }).await? {
            CachedValue::FindLatestRevision(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }

    pub async fn get_merge_files<F>(&self, key: CacheKey, init: F) -> Result<Arc<Value>>
    where
        F: Future<Output = Result<Value>> + Send,
    {
        match self.load(key, async move { init.await.map(|v| CachedValue::MergeFiles(Arc::new(v))) }).await? {
            CachedValue::MergeFiles(v) => Ok(v),
            _ => unreachable!("cache key/value variant mismatch"),
        }
    }
}

fn key_repo(key: &CacheKey) -> &RepoId {
    match key {
        CacheKey::Find { repo, .. }
        | CacheKey::Get { repo, .. }
        | CacheKey::History { repo, .. }
        | CacheKey::DiffQuery { repo, .. }
        | CacheKey::DiffPattern { repo, .. }
        | CacheKey::FindLatestRevision { repo, .. }
        | CacheKey::MergeFiles { repo, .. } => repo,
    }
}
