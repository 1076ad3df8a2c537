//! Commit metadata (§3) as seen by callers of history/diff/get: the
//! human-facing view over a commit object, independent of its on-disk
//! hash encoding (owned by `features::object_store`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::author::Author;
use super::revision::Revision;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    Plaintext,
    Markdown,
    Unknown,
}

impl Default for Markup {
    fn default() -> Self {
        Markup::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMessage {
    pub summary: String,
    pub detail: String,
    pub markup: Markup,
}

impl CommitMessage {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>, markup: Markup) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            markup,
        }
    }

    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self::new(summary, "", Markup::Unknown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub revision: Revision,
    pub author: Author,
    /// Millisecond precision, truncated from the underlying timestamp.
    pub when: DateTime<Utc>,
    pub message: CommitMessage,
}

impl Commit {
    pub fn new(revision: Revision, author: Author, message: CommitMessage) -> Self {
        let when = Utc::now();
        let truncated_millis = when.timestamp_millis();
        Self {
            revision,
            author,
            when: DateTime::from_timestamp_millis(truncated_millis).unwrap_or(when),
            message,
        }
    }
}
