//! Object store entities (§4.A): blobs, trees, and commits addressed by
//! a 20-byte SHA-1 digest of their canonical encoding.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub const HASH_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Some(Hash(out))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    fn header_tag(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

/// Raw entry content, hashed as `"<kind> <len>\0<body>"`.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_framing(ObjectKind::Blob, &self.data)
    }

    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.canonical_bytes())
    }

    pub fn parse(bytes: &[u8]) -> Option<Blob> {
        let (kind, body) = unframe(bytes)?;
        if kind != ObjectKind::Blob {
            return None;
        }
        Some(Blob::new(body.to_vec()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub hash: Hash,
}

/// A tree's canonical encoding sorts entries by name so two trees with
/// identical content always hash identically regardless of insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for entry in &self.entries {
            let mode_tag = match entry.mode {
                EntryMode::File => "100644",
                EntryMode::Directory => "040000",
            };
            body.extend_from_slice(mode_tag.as_bytes());
            body.push(b' ');
            body.extend_from_slice(entry.name.as_bytes());
            body.push(0);
            body.extend_from_slice(entry.hash.as_bytes());
        }
        canonical_framing(ObjectKind::Tree, &body)
    }

    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.canonical_bytes())
    }

    pub fn find(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn parse(bytes: &[u8]) -> Option<Tree> {
        let (kind, body) = unframe(bytes)?;
        if kind != ObjectKind::Tree {
            return None;
        }
        let mut entries = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let space = rest.iter().position(|&b| b == b' ')?;
            let mode = match &rest[..space] {
                b"100644" => EntryMode::File,
                b"040000" => EntryMode::Directory,
                _ => return None,
            };
            rest = &rest[space + 1..];
            let nul = rest.iter().position(|&b| b == 0)?;
            let name = std::str::from_utf8(&rest[..nul]).ok()?.to_string();
            rest = &rest[nul + 1..];
            if rest.len() < HASH_LEN {
                return None;
            }
            let mut hash_bytes = [0u8; HASH_LEN];
            hash_bytes.copy_from_slice(&rest[..HASH_LEN]);
            rest = &rest[HASH_LEN..];
            entries.push(TreeEntry {
                name,
                mode,
                hash: Hash(hash_bytes),
            });
        }
        Some(Tree { entries })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: Hash,
    pub parent: Option<Hash>,
    pub author_name: String,
    pub author_email: String,
    pub timestamp_millis: i64,
    pub summary: String,
    pub detail: String,
    pub markup: String,
    /// Embedded so the commit can be recovered from the object store
    /// alone if the commit-id index is lost (§4.B rebuild mode).
    pub revision: i64,
}

impl CommitObject {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"tree ");
        body.extend_from_slice(self.tree.to_hex().as_bytes());
        body.push(b'\n');
        if let Some(parent) = &self.parent {
            body.extend_from_slice(b"parent ");
            body.extend_from_slice(parent.to_hex().as_bytes());
            body.push(b'\n');
        }
        body.extend_from_slice(format!("author {} <{}> {}\n", self.author_name, self.author_email, self.timestamp_millis).as_bytes());
        body.extend_from_slice(format!("revision {}\n", self.revision).as_bytes());
        body.extend_from_slice(format!("markup {}\n", self.markup).as_bytes());
        body.push(b'\n');
        body.extend_from_slice(self.summary.as_bytes());
        body.push(b'\n');
        if !self.detail.is_empty() {
            body.push(b'\n');
            body.extend_from_slice(self.detail.as_bytes());
        }
        canonical_framing(ObjectKind::Commit, &body)
    }

    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.canonical_bytes())
    }

    /// Parse a commit back out of its own canonical encoding, so the
    /// object store is a true content-addressed store for commits too
    /// (the stored bytes are exactly what hashes to the commit's key).
    pub fn parse(bytes: &[u8]) -> Option<CommitObject> {
        let header_end = bytes.iter().position(|&b| b == 0)?;
        let body = &bytes[header_end + 1..];
        let text = std::str::from_utf8(body).ok()?;

        let mut lines = text.split('\n');
        let mut tree = None;
        let mut parent = None;
        let mut author_name = String::new();
        let mut author_email = String::new();
        let mut timestamp_millis = 0i64;
        let mut revision = 0i64;
        let mut markup = String::new();

        for line in &mut lines {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Hash::from_hex(rest);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parent = Hash::from_hex(rest);
            } else if let Some(rest) = line.strip_prefix("author ") {
                let (name_email, ts) = rest.rsplit_once(' ')?;
                timestamp_millis = ts.parse().ok()?;
                let (name, email) = name_email.rsplit_once(" <")?;
                author_name = name.to_string();
                author_email = email.trim_end_matches('>').to_string();
            } else if let Some(rest) = line.strip_prefix("revision ") {
                revision = rest.parse().ok()?;
            } else if let Some(rest) = line.strip_prefix("markup ") {
                markup = rest.to_string();
            }
        }

        let remainder: Vec<&str> = lines.collect();
        let summary = remainder.first().copied().unwrap_or("").to_string();
        let detail = if remainder.len() > 2 {
            remainder[2..].join("\n")
        } else {
            String::new()
        };

        Some(CommitObject {
            tree: tree?,
            parent,
            author_name,
            author_email,
            timestamp_millis,
            summary,
            detail,
            markup,
            revision,
        })
    }
}

/// Split a canonically-framed object back into its kind and body,
/// without validating the declared length against the actual body
/// length (the trailing NUL-split is authoritative either way).
fn unframe(bytes: &[u8]) -> Option<(ObjectKind, &[u8])> {
    let header_end = bytes.iter().position(|&b| b == 0)?;
    let header = std::str::from_utf8(&bytes[..header_end]).ok()?;
    let (tag, _len) = header.split_once(' ')?;
    let kind = match tag {
        "blob" => ObjectKind::Blob,
        "tree" => ObjectKind::Tree,
        "commit" => ObjectKind::Commit,
        _ => return None,
    };
    Some((kind, &bytes[header_end + 1..]))
}

fn canonical_framing(kind: ObjectKind, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(kind.header_tag().as_bytes());
    out.push(b' ');
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_hash_is_deterministic() {
        let a = Blob::new(b"hello".to_vec());
        let b = Blob::new(b"hello".to_vec());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn blob_parses_back_from_its_own_canonical_bytes() {
        let blob = Blob::new(b"hello world".to_vec());
        let parsed = Blob::parse(&blob.canonical_bytes()).unwrap();
        assert_eq!(parsed.data, blob.data);
    }

    #[test]
    fn tree_parses_back_from_its_own_canonical_bytes() {
        let tree = Tree::new(vec![
            TreeEntry {
                name: "a.txt".into(),
                mode: EntryMode::File,
                hash: Hash::from_bytes(b"a"),
            },
            TreeEntry {
                name: "sub".into(),
                mode: EntryMode::Directory,
                hash: Hash::from_bytes(b"sub"),
            },
        ]);
        let parsed = Tree::parse(&tree.canonical_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.find("a.txt").unwrap().mode, EntryMode::File);
        assert_eq!(parsed.find("sub").unwrap().mode, EntryMode::Directory);
    }

    #[test]
    fn tree_hash_is_order_independent() {
        let e1 = TreeEntry {
            name: "a.txt".into(),
            mode: EntryMode::File,
            hash: Hash::from_bytes(b"a"),
        };
        let e2 = TreeEntry {
            name: "b.txt".into(),
            mode: EntryMode::File,
            hash: Hash::from_bytes(b"b"),
        };
        let t1 = Tree::new(vec![e1.clone(), e2.clone()]);
        let t2 = Tree::new(vec![e2, e1]);
        assert_eq!(t1.hash(), t2.hash());
    }

    #[test]
    fn hash_round_trips_through_hex() {
        let h = Hash::from_bytes(b"anything");
        assert_eq!(Hash::from_hex(&h.to_hex()), Some(h));
    }

    #[test]
    fn commit_parses_back_from_its_own_canonical_bytes() {
        let commit = CommitObject {
            tree: Hash::from_bytes(b"tree"),
            parent: Some(Hash::from_bytes(b"parent")),
            author_name: "Ada Lovelace".into(),
            author_email: "ada@example.com".into(),
            timestamp_millis: 1234,
            summary: "add config".into(),
            detail: "first line\nsecond line".into(),
            markup: "markdown".into(),
            revision: 3,
        };
        let bytes = commit.canonical_bytes();
        let parsed = CommitObject::parse(&bytes).unwrap();
        assert_eq!(parsed.tree, commit.tree);
        assert_eq!(parsed.parent, commit.parent);
        assert_eq!(parsed.author_name, commit.author_name);
        assert_eq!(parsed.author_email, commit.author_email);
        assert_eq!(parsed.revision, commit.revision);
        assert_eq!(parsed.summary, commit.summary);
        assert_eq!(parsed.detail, commit.detail);
    }

    #[test]
    fn commit_without_detail_round_trips() {
        let commit = CommitObject {
            tree: Hash::from_bytes(b"tree"),
            parent: None,
            author_name: "System".into(),
            author_email: "system@localhost".into(),
            timestamp_millis: 0,
            summary: "init".into(),
            detail: String::new(),
            markup: "unknown".into(),
            revision: 1,
        };
        let bytes = commit.canonical_bytes();
        let parsed = CommitObject::parse(&bytes).unwrap();
        assert_eq!(parsed.parent, None);
        assert_eq!(parsed.detail, "");
        assert_eq!(parsed.summary, "init");
    }
}
