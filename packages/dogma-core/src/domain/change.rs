//! Changes (§3): the unit of mutation submitted in a commit, and the
//! content-specific operation each one carries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeContent {
    /// Replace (or create) a text entry with the given body.
    UpsertText(String),
    /// Replace (or create) a JSON entry with the given tree.
    UpsertJson(serde_json::Value),
    /// Replace (or create) a YAML entry from a JSON tree.
    UpsertYaml(serde_json::Value),
    /// Apply an RFC 6902 JSON Patch document to an existing JSON/YAML entry.
    ApplyJsonPatch(serde_json::Value),
    /// Apply a unified-diff text patch to an existing text entry.
    ApplyTextPatch(String),
    /// Delete the entry (file or directory, recursively) at this path.
    Remove,
    /// Move the entry at this path to the given destination path.
    Rename(String),
}

impl ChangeContent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeContent::UpsertText(_) => "UPSERT_TEXT",
            ChangeContent::UpsertJson(_) => "UPSERT_JSON",
            ChangeContent::UpsertYaml(_) => "UPSERT_YAML",
            ChangeContent::ApplyJsonPatch(_) => "APPLY_JSON_PATCH",
            ChangeContent::ApplyTextPatch(_) => "APPLY_TEXT_PATCH",
            ChangeContent::Remove => "REMOVE",
            ChangeContent::Rename(_) => "RENAME",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub path: String,
    pub content: ChangeContent,
}

impl Change {
    pub fn new(path: impl Into<String>, content: ChangeContent) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }

    pub fn upsert_text(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(path, ChangeContent::UpsertText(body.into()))
    }

    pub fn upsert_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(path, ChangeContent::UpsertJson(body))
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(path, ChangeContent::Remove)
    }

    pub fn rename(path: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(path, ChangeContent::Rename(destination.into()))
    }
}
