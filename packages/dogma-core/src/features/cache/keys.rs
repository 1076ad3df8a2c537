//! Cache key types (§4.D): one variant per cacheable call, each keyed by
//! repository identity plus the call's own fields.

use std::sync::Arc;

use crate::domain::{PathPattern, Revision};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub project: Arc<str>,
    pub repository: Arc<str>,
}

impl RepoId {
    pub fn new(project: impl Into<Arc<str>>, repository: impl Into<Arc<str>>) -> Self {
        Self {
            project: project.into(),
            repository: repository.into(),
        }
    }
}

/// Patterns don't implement `Eq`/`Hash` themselves (they wrap a compiled
/// `GlobSet`), so the cache keys on the pattern's normalized source text
/// instead, matching what actually determines its matching behavior.
fn pattern_key(pattern: &PathPattern) -> String {
    pattern.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Find {
        repo: RepoId,
        revision: Revision,
        pattern: String,
        fetch_content: bool,
        max_entries: Option<usize>,
    },
    Get {
        repo: RepoId,
        revision: Revision,
        path: String,
        query: String,
    },
    History {
        repo: RepoId,
        from: Revision,
        to: Revision,
        pattern: String,
        max: usize,
    },
    DiffQuery {
        repo: RepoId,
        from: Revision,
        to: Revision,
        path: String,
    },
    DiffPattern {
        repo: RepoId,
        from: Revision,
        to: Revision,
        pattern: String,
    },
    FindLatestRevision {
        repo: RepoId,
        last_known: Revision,
        pattern: String,
    },
    MergeFiles {
        repo: RepoId,
        revision: Revision,
        paths: Vec<String>,
    },
}

impl CacheKey {
    pub fn find(repo: RepoId, revision: Revision, pattern: &PathPattern, fetch_content: bool, max_entries: Option<usize>) -> Self {
        CacheKey::Find {
            repo,
            revision,
            pattern: pattern_key(pattern),
            fetch_content,
            max_entries,
        }
    }

    pub fn get(repo: RepoId, revision: Revision, path: &str, query_discriminant: &str) -> Self {
        CacheKey::Get {
            repo,
            revision,
            path: path.to_string(),
            query: query_discriminant.to_string(),
        }
    }

    pub fn history(repo: RepoId, from: Revision, to: Revision, pattern: &PathPattern, max: usize) -> Self {
        CacheKey::History {
            repo,
            from,
            to,
            pattern: pattern_key(pattern),
            max,
        }
    }

    pub fn diff_query(repo: RepoId, from: Revision, to: Revision, path: &str) -> Self {
        CacheKey::DiffQuery { repo, from, to, path: path.to_string() }
    }

    pub fn diff_pattern(repo: RepoId, from: Revision, to: Revision, pattern: &PathPattern) -> Self {
        CacheKey::DiffPattern { repo, from, to, pattern: pattern_key(pattern) }
    }

    pub fn find_latest_revision(repo: RepoId, last_known: Revision, pattern: &PathPattern) -> Self {
        CacheKey::FindLatestRevision { repo, last_known, pattern: pattern_key(pattern) }
    }

    pub fn merge_files(repo: RepoId, revision: Revision, mut paths: Vec<String>) -> Self {
        paths.sort();
        CacheKey::MergeFiles { repo, revision, paths }
    }
}
