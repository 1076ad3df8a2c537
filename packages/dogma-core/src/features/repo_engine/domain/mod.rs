//! Repository-engine value types (§4.C): the shapes `find`/`diff`/
//! `history` hand back, independent of how the working tree is stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Entry, EntryType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindOptions {
    pub fetch_content: bool,
    pub max_entries: Option<usize>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            fetch_content: true,
            max_entries: None,
        }
    }
}

/// The per-path content of a `modify` diff entry: a safe-replace JSON
/// patch for json/yaml entries, a unified diff for text entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffContent {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffEntry {
    Add {
        path: String,
        entry_type: EntryType,
        content: DiffContent,
    },
    Modify {
        path: String,
        entry_type: EntryType,
        patch: DiffContent,
    },
    Remove {
        path: String,
    },
    Rename {
        path: String,
        destination: String,
    },
}

impl DiffEntry {
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::Add { path, .. }
            | DiffEntry::Modify { path, .. }
            | DiffEntry::Remove { path }
            | DiffEntry::Rename { path, .. } => path,
        }
    }
}

/// A single commit's summary as returned by `history`, paired with the
/// paths its tree-diff against its parent actually touched.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub commit: crate::domain::Commit,
    pub touched_paths: Vec<String>,
}

pub(crate) fn entry_diff_content(entry: &Entry) -> DiffContent {
    match entry.as_json() {
        Some(v) => DiffContent::Json(v.clone()),
        None => DiffContent::Text(entry.as_text().unwrap_or_default().to_string()),
    }
}
