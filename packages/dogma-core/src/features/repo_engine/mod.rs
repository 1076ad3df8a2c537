//! Repository engine (§4.C): the versioned, single-branch commit log
//! over the content-addressed object store, with diff/history/find/get/
//! watch built on top of it.

pub mod domain;

mod diff;
mod engine;
mod working_tree;

pub use diff::diff_trees;
pub use domain::{DiffContent, DiffEntry, FindOptions, HistoryEntry};
pub use engine::{ReservedPathGuard, RepositoryEngine};
pub use working_tree::WorkingTree;
