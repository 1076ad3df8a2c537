//! Core domain types (§3): the vocabulary every feature module builds on.

pub mod author;
pub mod change;
pub mod commit;
pub mod entry;
pub mod path;
pub mod path_pattern;
pub mod project;
pub mod query;
pub mod repository;
pub mod revision;

pub use author::Author;
pub use change::{Change, ChangeContent};
pub use commit::{Commit, CommitMessage, Markup};
pub use entry::{Entry, EntryContent, EntryType};
pub use path_pattern::PathPattern;
pub use project::Project;
pub use query::{Query, QueryType};
pub use repository::RepositoryMetadata;
pub use revision::Revision;
