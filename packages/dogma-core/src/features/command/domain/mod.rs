//! Command executor value types (§4.F): the tagged command variants
//! replicated through the log, their outcomes, and the transformer
//! contract `transform` dispatches through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Author, Change, Entry, Markup, Revision};
use crate::error::Result;
use crate::features::repo_engine::DiffEntry;

/// Every mutating operation the executor accepts (§4.F), serialized
/// into a [`super::ports::LogRecord`] payload with an explicit `type`
/// discriminator so replication replay never depends on enum variant
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    CreateProject {
        author: Author,
        name: String,
    },
    RemoveProject {
        name: String,
    },
    PurgeProject {
        name: String,
    },
    UnremoveProject {
        name: String,
    },
    CreateRepository {
        author: Author,
        project: String,
        name: String,
    },
    RemoveRepository {
        project: String,
        name: String,
    },
    PurgeRepository {
        project: String,
        name: String,
    },
    UnremoveRepository {
        project: String,
        name: String,
    },
    NormalizingPush {
        project: String,
        repository: String,
        base_revision: Revision,
        author: Author,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    },
    PushAsIs {
        project: String,
        repository: String,
        base_revision: Revision,
        author: Author,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    },
    Transform {
        project: String,
        repository: String,
        base_revision: Revision,
        author: Author,
        summary: String,
        detail: String,
        markup: Markup,
        /// Name of a [`Transformer`] registered with the executor's
        /// [`super::registry::TransformerRegistry`]. Transformers are
        /// in-process closures, not serializable data, so the log
        /// carries a name every replica resolves identically rather
        /// than the transformer itself.
        transformer: String,
    },
    CreateSession {
        session_id: String,
        user: String,
        ttl_secs: u64,
    },
    RemoveSession {
        session_id: String,
    },
    UpdateServerStatus {
        read_only: bool,
    },
    /// Wraps `NormalizingPush` or `PushAsIs`, forcing `author = system`
    /// and bypassing read-only mode (§4.F). Any other inner command is
    /// rejected by the executor before it reaches the log.
    ForcePush(Box<Command>),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateProject { .. } => "CREATE_PROJECT",
            Command::RemoveProject { .. } => "REMOVE_PROJECT",
            Command::PurgeProject { .. } => "PURGE_PROJECT",
            Command::UnremoveProject { .. } => "UNREMOVE_PROJECT",
            Command::CreateRepository { .. } => "CREATE_REPOSITORY",
            Command::RemoveRepository { .. } => "REMOVE_REPOSITORY",
            Command::PurgeRepository { .. } => "PURGE_REPOSITORY",
            Command::UnremoveRepository { .. } => "UNREMOVE_REPOSITORY",
            Command::NormalizingPush { .. } => "NORMALIZING_PUSH",
            Command::PushAsIs { .. } => "PUSH_AS_IS",
            Command::Transform { .. } => "TRANSFORM",
            Command::CreateSession { .. } => "CREATE_SESSION",
            Command::RemoveSession { .. } => "REMOVE_SESSION",
            Command::UpdateServerStatus { .. } => "UPDATE_SERVER_STATUS",
            Command::ForcePush(_) => "FORCE_PUSH",
        }
    }
}

/// What applying a [`Command`] produced, returned to the submitter and
/// (on fault) carrying enough information that the caller sees the
/// same semantic failure a follower would reconstruct (§4.F Failure
/// semantics: faults are recorded and applied deterministically).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandOutcome {
    Unit,
    Revision(Revision),
    Push { revision: Revision, changes: Vec<DiffEntry> },
}

/// The `transform` command's payload (§6): receives the tree at `base`
/// and produces the changes to commit. Registered by name (see
/// [`super::registry::TransformerRegistry`]) rather than carried as
/// data, since an arbitrary transformation isn't serializable.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, entries: &[Entry]) -> Result<Vec<Change>>;
}

/// A short-lived authentication artifact (§4.F `create-session`/
/// `remove-session`). Sessions are cluster-wide bookkeeping, not
/// versioned repository content, so they're tracked directly by the
/// registry rather than committed into a repository tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            session_id: session_id.into(),
            user: user.into(),
            created_at: Utc::now(),
            ttl_secs,
        }
    }
}
