//! Entries (§3): paths, their inferred type, and canonicalized content.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Directory,
    Text,
    Json,
    Yaml,
}

impl EntryType {
    /// Infer the type of a file (never a directory) from its extension,
    /// per §3: `.json`/`.json5` is Json, `.yml`/`.yaml` is Yaml, anything
    /// else is Text.
    pub fn infer_from_path(path: &str) -> EntryType {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".json") || lower.ends_with(".json5") {
            EntryType::Json
        } else if lower.ends_with(".yml") || lower.ends_with(".yaml") {
            EntryType::Yaml
        } else {
            EntryType::Text
        }
    }

    pub fn is_json_like(&self) -> bool {
        matches!(self, EntryType::Json | EntryType::Yaml)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryContent {
    Directory,
    Text(String),
    /// Shared by Json and Yaml entries: both are normalized into a JSON
    /// tree for structural comparison and JSONPath queries, per §3's
    /// "typed view (parsed JSON tree for json/yaml, sanitized text for
    /// text)".
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub path: String,
    pub entry_type: EntryType,
    pub content: EntryContent,
    pub revision: crate::domain::Revision,
}

impl Entry {
    pub fn directory(path: impl Into<String>, revision: crate::domain::Revision) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::Directory,
            content: EntryContent::Directory,
            revision,
        }
    }

    /// `\r` stripped; a trailing `\n` appended if the body is non-empty
    /// and didn't already end with one. Idempotent by construction.
    pub fn canonicalize_text(raw: &str) -> String {
        let stripped: String = raw.chars().filter(|&c| c != '\r').collect();
        if stripped.is_empty() || stripped.ends_with('\n') {
            stripped
        } else {
            let mut s = stripped;
            s.push('\n');
            s
        }
    }

    /// The canonical on-disk bytes for this entry's content, used both to
    /// hash the object and to serve raw reads. `None` for directories.
    pub fn canonical_bytes(&self) -> Option<Vec<u8>> {
        match (&self.entry_type, &self.content) {
            (EntryType::Directory, _) => None,
            (EntryType::Text, EntryContent::Text(s)) => Some(s.as_bytes().to_vec()),
            (EntryType::Json, EntryContent::Json(v)) => serde_json::to_vec(v).ok(),
            (EntryType::Yaml, EntryContent::Json(v)) => {
                serde_yaml::to_string(v).ok().map(|s| s.into_bytes())
            }
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match &self.content {
            EntryContent::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            EntryContent::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_canonicalization_strips_cr_and_appends_newline() {
        assert_eq!(Entry::canonicalize_text("hello"), "hello\n");
        assert_eq!(Entry::canonicalize_text("hello\r\n"), "hello\n");
        assert_eq!(Entry::canonicalize_text("hello\n"), "hello\n");
    }

    #[test]
    fn empty_text_stays_empty() {
        assert_eq!(Entry::canonicalize_text(""), "");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = Entry::canonicalize_text("a\r\nb");
        let twice = Entry::canonicalize_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn type_inferred_from_extension() {
        assert_eq!(EntryType::infer_from_path("/a.json"), EntryType::Json);
        assert_eq!(EntryType::infer_from_path("/a.JSON"), EntryType::Json);
        assert_eq!(EntryType::infer_from_path("/a.yaml"), EntryType::Yaml);
        assert_eq!(EntryType::infer_from_path("/a.yml"), EntryType::Yaml);
        assert_eq!(EntryType::infer_from_path("/a.txt"), EntryType::Text);
        assert_eq!(EntryType::infer_from_path("/a"), EntryType::Text);
    }
}
