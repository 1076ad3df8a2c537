//! Repository engine (§4.C): the only path through which a repository's
//! commits are created, queried, and diffed. `commit` is the sole
//! mutating entry point; everything else is a read over the commit-id
//! index and object store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::domain::{
    path, Author, Change, ChangeContent, Commit, CommitMessage, Entry, EntryContent, EntryType,
    PathPattern, Query, QueryType, Revision,
};
use crate::error::{DogmaError, Result};
use crate::features::cache::{CacheKey, QueryCache, RepoId};
use crate::features::commit_index::CommitIndex;
use crate::features::object_store::{CommitObject, Hash, ObjectStore};
use crate::features::watch::{self, WatchMultiplexer};

use super::diff::diff_trees;
use super::domain::{DiffEntry, FindOptions, HistoryEntry};
use super::working_tree::WorkingTree;

/// Rejects a `(project, repository, path)` triple that a push must not
/// touch (§[SUPPLEMENT] reserved-repository guard). The default,
/// constructed by callers via `RepositoryEngine::new`, rejects writes
/// under `dogma/**` from anything but the command executor itself.
pub type ReservedPathGuard = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
struct HeadState {
    revision: i64,
    commit_hash: Hash,
    tree_hash: Option<Hash>,
}

pub struct RepositoryEngine {
    project: String,
    repository: String,
    object_store: Arc<dyn ObjectStore>,
    commit_index: Arc<dyn CommitIndex>,
    watch_mux: Arc<WatchMultiplexer>,
    write_lock: tokio::sync::Mutex<()>,
    head: RwLock<Option<HeadState>>,
    cache: Arc<QueryCache>,
    repo_id: RepoId,
    max_commit_payload_bytes: usize,
    reserved_guard: ReservedPathGuard,
}

impl RepositoryEngine {
    pub fn new(
        project: impl Into<String>,
        repository: impl Into<String>,
        object_store: Arc<dyn ObjectStore>,
        commit_index: Arc<dyn CommitIndex>,
        watch_mux: Arc<WatchMultiplexer>,
        cache: Arc<QueryCache>,
        max_commit_payload_bytes: usize,
    ) -> Self {
        let project = project.into();
        let repository = repository.into();
        let is_dogma = repository == crate::domain::project::SYSTEM_MANAGED_REPOSITORY;
        let repo_id = RepoId::new(project.clone(), repository.clone());
        Self {
            project,
            repository,
            object_store,
            commit_index,
            watch_mux,
            write_lock: tokio::sync::Mutex::new(()),
            head: RwLock::new(None),
            cache,
            repo_id,
            max_commit_payload_bytes,
            reserved_guard: Arc::new(move |path: &str| is_dogma && path::is_under(path, "/")),
        }
    }

    pub fn with_reserved_guard(mut self, guard: ReservedPathGuard) -> Self {
        self.reserved_guard = guard;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Load the current head from the commit-id index, if one exists.
    /// Called once when a repository is opened from existing storage.
    pub async fn load_head(&self) -> Result<()> {
        if let Some(revision) = self.commit_index.head().await? {
            let hash = self
                .commit_index
                .get(revision)
                .await?
                .ok_or_else(|| DogmaError::Storage(format!("missing commit-index record for revision {revision}")))?;
            let bytes = self
                .object_store
                .get(hash)
                .await?
                .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} missing from store")))?;
            let commit = CommitObject::parse(&bytes)
                .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} is corrupt")))?;
            *self.head.write() = Some(HeadState {
                revision: revision.value(),
                commit_hash: hash,
                tree_hash: Some(commit.tree),
            });
        }
        Ok(())
    }

    pub fn head_revision(&self) -> Option<Revision> {
        self.head.read().as_ref().map(|h| Revision::new(h.revision))
    }

    /// Create the repository's initial empty commit (revision 1). A
    /// no-op if the repository already has a head.
    #[instrument(skip(self, author))]
    pub async fn initialize(&self, author: Author) -> Result<Revision> {
        if let Some(head) = self.head.read().as_ref() {
            return Ok(Revision::new(head.revision));
        }
        let _guard = self.write_lock.lock().await;
        if let Some(head) = self.head.read().as_ref() {
            return Ok(Revision::new(head.revision));
        }

        let tree = WorkingTree::empty();
        let tree_hash = tree.persist(self.object_store.as_ref()).await?;
        let commit = CommitObject {
            tree: tree_hash,
            parent: None,
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
            summary: "Create a new repository".to_string(),
            detail: String::new(),
            markup: "unknown".to_string(),
            revision: 1,
        };
        let commit_bytes = commit.canonical_bytes();
        let commit_hash = commit.hash();
        self.object_store.put(commit_hash, commit_bytes).await?;
        self.commit_index.put(Revision::new(1), commit_hash).await?;

        *self.head.write() = Some(HeadState {
            revision: 1,
            commit_hash,
            tree_hash: Some(tree_hash),
        });
        info!(project = %self.project, repository = %self.repository, "repository initialized");
        Ok(Revision::new(1))
    }

    fn resolve_head(&self) -> Result<HeadState> {
        self.head
            .read()
            .clone()
            .ok_or_else(|| DogmaError::Storage("repository has no head; call initialize() first".into()))
    }

    fn normalize(&self, revision: Revision, head_value: i64) -> Result<i64> {
        revision
            .normalize(head_value)
            .ok_or(DogmaError::RevisionNotFound { revision: revision.value(), head: head_value })
    }

    async fn load_tree_at(&self, revision_value: i64) -> Result<WorkingTree> {
        let hash = self
            .commit_index
            .get(Revision::new(revision_value))
            .await?
            .ok_or(DogmaError::RevisionNotFound {
                revision: revision_value,
                head: self.resolve_head()?.revision,
            })?;
        let bytes = self
            .object_store
            .get(hash)
            .await?
            .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} missing")))?;
        let commit = CommitObject::parse(&bytes)
            .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} is corrupt")))?;
        WorkingTree::load(self.object_store.as_ref(), Some(commit.tree), Revision::new(revision_value)).await
    }

    /// Apply `changes` on top of the current head, producing a new
    /// commit. Returns the new revision and the normalized diff (the
    /// effective changes actually applied, in diff form) — the caller
    /// decides whether to surface that to the user (`normalizing_push`)
    /// or discard it (`push_as_is`).
    #[instrument(skip(self, author, changes), fields(project = %self.project, repository = %self.repository))]
    /// `bypass_guard` lets the command executor write `dogma/**` entries
    /// it manages itself (e.g. session bookkeeping) while ordinary user
    /// pushes still go through the reserved-path guard.
    pub async fn commit(
        &self,
        base: Revision,
        author: Author,
        message: CommitMessage,
        changes: Vec<Change>,
        allow_empty: bool,
        bypass_guard: bool,
    ) -> Result<(Revision, Vec<DiffEntry>)> {
        let payload_size: usize = changes
            .iter()
            .map(|c| match &c.content {
                ChangeContent::UpsertText(s) => s.len(),
                ChangeContent::UpsertJson(v) | ChangeContent::UpsertYaml(v) | ChangeContent::ApplyJsonPatch(v) => {
                    serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0)
                }
                ChangeContent::ApplyTextPatch(s) => s.len(),
                ChangeContent::Remove => 0,
                ChangeContent::Rename(dest) => dest.len(),
            })
            .sum();
        if payload_size > self.max_commit_payload_bytes {
            return Err(DogmaError::TooLargeRequest {
                size: payload_size,
                limit: self.max_commit_payload_bytes,
            });
        }

        let _guard = self.write_lock.lock().await;
        let head = self.resolve_head()?;
        self.normalize(base, head.revision)?;

        let mut tree = WorkingTree::load(self.object_store.as_ref(), head.tree_hash, Revision::new(head.revision + 1)).await?;
        let before = tree.clone();

        for change in &changes {
            self.apply_change(&mut tree, change, Revision::new(head.revision + 1), bypass_guard)?;
        }

        let new_tree_hash = tree.persist(self.object_store.as_ref()).await?;
        if Some(new_tree_hash) == head.tree_hash && !allow_empty {
            return Err(DogmaError::RedundantChange);
        }

        let new_revision = head.revision + 1;
        let commit = CommitObject {
            tree: new_tree_hash,
            parent: Some(head.commit_hash),
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
            summary: message.summary.clone(),
            detail: message.detail.clone(),
            markup: format!("{:?}", message.markup).to_lowercase(),
            revision: new_revision,
        };
        let commit_bytes = commit.canonical_bytes();
        let commit_hash = commit.hash();
        self.object_store.put(commit_hash, commit_bytes).await?;
        self.commit_index.put(Revision::new(new_revision), commit_hash).await?;

        *self.head.write() = Some(HeadState {
            revision: new_revision,
            commit_hash,
            tree_hash: Some(new_tree_hash),
        });

        let normalized_diff = diff_trees(&before, &tree, &PathPattern::all());
        let changed_paths: Vec<String> = normalized_diff.iter().map(|d| d.path().to_string()).collect();

        // Notify watchers off the write lock (it was already released by
        // the `_guard` drop at scope end — we intentionally compute the
        // notification after the lock-guarded section above completes).
        drop(_guard);
        self.cache.invalidate_repository(&self.repo_id).await;
        self.watch_mux.notify(Revision::new(new_revision), &changed_paths);

        info!(revision = new_revision, changes = changed_paths.len(), "commit applied");
        Ok((Revision::new(new_revision), normalized_diff))
    }

    fn apply_change(
        &self,
        tree: &mut WorkingTree,
        change: &Change,
        new_revision: Revision,
        bypass_guard: bool,
    ) -> Result<()> {
        path::validate_path(&change.path)?;
        if !bypass_guard && (self.reserved_guard)(&change.path) {
            return Err(DogmaError::InvalidPush {
                repository: format!("{}/{}", self.project, self.repository),
                reason: format!("{} is managed by the system and cannot be written directly", change.path),
            });
        }

        match &change.content {
            ChangeContent::UpsertText(body) => {
                let canonical = Entry::canonicalize_text(body);
                if let Some(old) = tree.get(&change.path) {
                    if old.entry_type == EntryType::Text && old.as_text() == Some(canonical.as_str()) {
                        return Ok(());
                    }
                }
                tree.upsert(&change.path, EntryType::Text, EntryContent::Text(canonical), new_revision);
                Ok(())
            }
            ChangeContent::UpsertJson(value) => {
                if let Some(old) = tree.get(&change.path) {
                    if old.entry_type == EntryType::Json && old.as_json() == Some(value) {
                        return Ok(());
                    }
                }
                tree.upsert(&change.path, EntryType::Json, EntryContent::Json(value.clone()), new_revision);
                Ok(())
            }
            ChangeContent::UpsertYaml(value) => {
                if let Some(old) = tree.get(&change.path) {
                    if old.entry_type == EntryType::Yaml && old.as_json() == Some(value) {
                        return Ok(());
                    }
                }
                tree.upsert(&change.path, EntryType::Yaml, EntryContent::Json(value.clone()), new_revision);
                Ok(())
            }
            ChangeContent::ApplyJsonPatch(patch_doc) => {
                let old_entry = tree.get(&change.path);
                let old_json = old_entry.and_then(|e| e.as_json().cloned()).unwrap_or(serde_json::Value::Null);
                let entry_type = old_entry.map(|e| e.entry_type).unwrap_or_else(|| EntryType::infer_from_path(&change.path));
                let new_json = crate::features::patch::apply_json_patch(&old_json, patch_doc)?;
                tree.upsert(&change.path, entry_type, EntryContent::Json(new_json), new_revision);
                Ok(())
            }
            ChangeContent::ApplyTextPatch(unified_diff) => {
                let old_text = tree.get(&change.path).and_then(|e| e.as_text()).unwrap_or("").to_string();
                let patched = crate::features::patch::apply_text_patch(&old_text, unified_diff)?;
                let canonical = Entry::canonicalize_text(&patched);
                tree.upsert(&change.path, EntryType::Text, EntryContent::Text(canonical), new_revision);
                Ok(())
            }
            ChangeContent::Remove => {
                if !tree.exists(&change.path) {
                    return Err(DogmaError::ChangeConflict {
                        path: change.path.clone(),
                        reason: "nothing to remove".into(),
                    });
                }
                tree.remove_subtree(&change.path);
                Ok(())
            }
            ChangeContent::Rename(destination) => {
                path::validate_path(destination)?;
                if tree.exists(destination) {
                    return Err(DogmaError::ChangeConflict {
                        path: change.path.clone(),
                        reason: format!("rename destination {destination} already exists"),
                    });
                }
                if !tree.exists(&change.path) {
                    return Err(DogmaError::ChangeConflict {
                        path: change.path.clone(),
                        reason: "rename source does not exist".into(),
                    });
                }
                tree.rename_subtree(&change.path, destination);
                Ok(())
            }
        }
    }

    pub async fn diff(&self, from: Revision, to: Revision, pattern: &PathPattern) -> Result<Vec<DiffEntry>> {
        let head = self.resolve_head()?;
        let from_value = self.normalize(from, head.revision)?;
        let to_value = self.normalize(to, head.revision)?;
        let key = CacheKey::diff_pattern(self.repo_id.clone(), Revision::new(from_value), Revision::new(to_value), pattern);
        let diff = self
            .cache
            .get_diff(key, async {
                let old_tree = self.load_tree_at(from_value).await?;
                let new_tree = self.load_tree_at(to_value).await?;
                Ok(diff_trees(&old_tree, &new_tree, pattern))
            })
            .await?;
        Ok((*diff).clone())
    }

    /// Walk the linear parent chain between `from` and `to` (inclusive),
    /// in descending order if `from > to`, filtering to commits whose
    /// diff against their parent touches `pattern`.
    pub async fn history(
        &self,
        from: Revision,
        to: Revision,
        pattern: &PathPattern,
        max: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let head = self.resolve_head()?;
        let from_value = self.normalize(from, head.revision)?;
        let to_value = self.normalize(to, head.revision)?;
        let key = CacheKey::history(self.repo_id.clone(), Revision::new(from_value), Revision::new(to_value), pattern, max);
        let history = self
            .cache
            .get_history(key, async {
                let (lo, hi, descending) = if from_value <= to_value {
                    (from_value, to_value, false)
                } else {
                    (to_value, from_value, true)
                };

                let mut out = Vec::new();
                let mut revision = if descending { hi } else { lo };
                loop {
                    if out.len() >= max {
                        break;
                    }
                    if revision < lo || revision > hi {
                        break;
                    }
                    let hash = self
                        .commit_index
                        .get(Revision::new(revision))
                        .await?
                        .ok_or(DogmaError::RevisionNotFound { revision, head: head.revision })?;
                    let bytes = self
                        .object_store
                        .get(hash)
                        .await?
                        .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} missing")))?;
                    let commit_obj = CommitObject::parse(&bytes)
                        .ok_or_else(|| DogmaError::Storage(format!("commit object {hash} is corrupt")))?;

                    let parent_tree = if revision > 1 {
                        self.load_tree_at(revision - 1).await?
                    } else {
                        WorkingTree::empty()
                    };
                    let this_tree = self.load_tree_at(revision).await?;
                    let touched: Vec<String> = diff_trees(&parent_tree, &this_tree, &PathPattern::all())
                        .into_iter()
                        .map(|d| d.path().to_string())
                        .collect();

                    if touched.iter().any(|p| pattern.matches(p)) {
                        out.push(HistoryEntry {
                            commit: Commit::new(
                                Revision::new(revision),
                                Author::new(commit_obj.author_name.clone(), commit_obj.author_email.clone()),
                                CommitMessage::new(commit_obj.summary.clone(), commit_obj.detail.clone(), parse_markup(&commit_obj.markup)),
                            ),
                            touched_paths: touched,
                        });
                    }

                    if descending {
                        if revision == lo {
                            break;
                        }
                        revision -= 1;
                    } else {
                        if revision == hi {
                            break;
                        }
                        revision += 1;
                    }
                }
                Ok(out)
            })
            .await?;
        Ok((*history).clone())
    }

    pub async fn find(&self, revision: Revision, pattern: &PathPattern, options: FindOptions) -> Result<Vec<Entry>> {
        let head = self.resolve_head()?;
        let revision_value = self.normalize(revision, head.revision)?;
        let key = CacheKey::find(self.repo_id.clone(), Revision::new(revision_value), pattern, options.fetch_content, options.max_entries);
        let found = self
            .cache
            .get_find(key, async {
                let tree = self.load_tree_at(revision_value).await?;

                let mut out = Vec::new();
                for (path, entry) in tree.iter() {
                    if !pattern.matches(path) {
                        continue;
                    }
                    if options.fetch_content {
                        out.push(entry.clone());
                    } else {
                        out.push(Entry {
                            path: entry.path.clone(),
                            entry_type: entry.entry_type,
                            content: EntryContent::Directory,
                            revision: entry.revision,
                        });
                    }
                    if let Some(max) = options.max_entries {
                        if out.len() >= max {
                            break;
                        }
                    }
                }
                Ok(out)
            })
            .await?;
        Ok((*found).clone())
    }

    pub async fn get(&self, revision: Revision, query: &Query) -> Result<Entry> {
        let head = self.resolve_head()?;
        let revision_value = self.normalize(revision, head.revision)?;
        let key = CacheKey::get(self.repo_id.clone(), Revision::new(revision_value), &query.path, &query_discriminant(&query.query_type));
        let entry = self
            .cache
            .get_get(key, async {
                let tree = self.load_tree_at(revision_value).await?;
                let entry = tree
                    .get(&query.path)
                    .ok_or_else(|| DogmaError::EntryNotFound { path: query.path.clone() })?;

                match &query.query_type {
                    QueryType::Identity => Ok(entry.clone()),
                    QueryType::IdentityText => {
                        if entry.entry_type != EntryType::Text {
                            return Err(DogmaError::InvalidQuery(format!("{} is not a text entry", query.path)));
                        }
                        Ok(entry.clone())
                    }
                    QueryType::IdentityJson => {
                        if !entry.entry_type.is_json_like() {
                            return Err(DogmaError::InvalidQuery(format!("{} is not a json/yaml entry", query.path)));
                        }
                        Ok(entry.clone())
                    }
                    QueryType::JsonPath(_) => {
                        let source = entry
                            .as_json()
                            .ok_or_else(|| DogmaError::InvalidQuery(format!("{} is not json/yaml", query.path)))?;
                        let projected = query.apply_json(source)?;
                        Ok(Entry {
                            path: entry.path.clone(),
                            entry_type: entry.entry_type,
                            content: EntryContent::Json(projected),
                            revision: entry.revision,
                        })
                    }
                }
            })
            .await?;
        Ok((*entry).clone())
    }

    pub async fn find_latest_revision(&self, last_known: Revision, pattern: &PathPattern) -> Result<Option<Revision>> {
        let head = self.resolve_head()?;
        let last_known_value = self.normalize(last_known, head.revision)?;
        if last_known_value >= head.revision {
            return Ok(None);
        }
        let key = CacheKey::find_latest_revision(self.repo_id.clone(), Revision::new(last_known_value), pattern);
        self.cache
            .get_find_latest_revision(key, async {
                for candidate in ((last_known_value + 1)..=head.revision).rev() {
                    let parent_tree = self.load_tree_at(candidate - 1).await?;
                    let this_tree = self.load_tree_at(candidate).await?;
                    let touched = diff_trees(&parent_tree, &this_tree, pattern);
                    if !touched.is_empty() {
                        return Ok(Some(Revision::new(candidate)));
                    }
                }
                Ok(None)
            })
            .await
    }

    pub async fn watch(&self, last_known: Revision, pattern: PathPattern, timeout: Duration) -> Result<Option<Revision>> {
        let head = self.resolve_head()?;
        let last_known_value = self.normalize(last_known, head.revision)?;
        let immediate = self.find_latest_revision(Revision::new(last_known_value), &pattern).await?;
        let outcome = watch::watch(&self.watch_mux, Revision::new(last_known_value), pattern, immediate, timeout).await;
        match outcome {
            watch::WatchOutcome::Changed(revision) => Ok(Some(revision)),
            watch::WatchOutcome::TimedOut => Ok(None),
            watch::WatchOutcome::Cancelled => {
                warn!("watch cancelled");
                Err(DogmaError::Cancelled)
            }
        }
    }
}

/// Collapses a [`QueryType`] to the string the cache keys `get` calls on,
/// so distinct JSONPath expressions over the same path/revision don't
/// collide in the cache.
fn query_discriminant(query_type: &QueryType) -> String {
    match query_type {
        QueryType::Identity => "identity".to_string(),
        QueryType::IdentityText => "identity_text".to_string(),
        QueryType::IdentityJson => "identity_json".to_string(),
        QueryType::JsonPath(expressions) => format!("jsonpath:{}", expressions.join("|")),
    }
}

fn parse_markup(s: &str) -> crate::domain::Markup {
    match s {
        "plaintext" => crate::domain::Markup::Plaintext,
        "markdown" => crate::domain::Markup::Markdown,
        _ => crate::domain::Markup::Unknown,
    }
}
