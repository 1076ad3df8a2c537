//! Projects (§3 SUPPLEMENT): the top-level namespace a set of
//! repositories lives under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::author::Author;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub creator: Author,
    pub created_at: DateTime<Utc>,
    /// Soft-deleted projects are hidden from listings but retained on disk
    /// until purged, mirroring repository removal semantics in §4.A.
    pub removed_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(name: impl Into<String>, creator: Author) -> Self {
        Self {
            name: name.into(),
            creator,
            created_at: Utc::now(),
            removed_at: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

/// Every project is given two reserved repositories at creation, matching
/// the real system's split: `dogma` holds project metadata/permissions
/// the server itself manages; `meta` holds user-writable administrative
/// config (mirror credentials, repository metadata). Per §7's
/// `invalid-push`, pushes to `dogma` outside the command executor's own
/// writes are rejected.
pub const RESERVED_REPOSITORIES: [&str; 2] = ["dogma", "meta"];
/// The subset of reserved repositories that reject direct user writes.
pub const SYSTEM_MANAGED_REPOSITORY: &str = "dogma";

pub fn is_reserved_repository(name: &str) -> bool {
    RESERVED_REPOSITORIES.contains(&name)
}
