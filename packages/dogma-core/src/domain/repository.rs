//! Repositories (§3): a named, independent commit history under a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::author::Author;
use super::revision::Revision;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryMetadata {
    pub project: String,
    pub name: String,
    pub creator: Author,
    pub created_at: DateTime<Utc>,
    pub head: Revision,
    pub removed_at: Option<DateTime<Utc>>,
}

impl RepositoryMetadata {
    pub fn new(project: impl Into<String>, name: impl Into<String>, creator: Author) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            creator,
            created_at: Utc::now(),
            head: Revision::INIT,
            removed_at: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    pub fn is_reserved(&self) -> bool {
        super::project::is_reserved_repository(&self.name)
    }

    pub fn is_system_managed(&self) -> bool {
        self.name == super::project::SYSTEM_MANAGED_REPOSITORY
    }
}

/// A repository name must be URL-safe: ASCII letters, digits, `-`, `_`,
/// and `.`, and must not start with `.`.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe_names_are_accepted() {
        assert!(validate_name("my-repo_1.0"));
    }

    #[test]
    fn names_starting_with_dot_are_rejected() {
        assert!(!validate_name(".hidden"));
    }

    #[test]
    fn names_with_slashes_are_rejected() {
        assert!(!validate_name("a/b"));
    }
}
