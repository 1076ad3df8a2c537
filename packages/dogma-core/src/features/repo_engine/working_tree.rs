//! In-memory working tree (§4.C step 3): a mutable index built from the
//! head tree, mutated by a change list, then persisted back into nested
//! tree/blob objects.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::domain::{path, Entry, EntryContent, EntryType, Revision};
use crate::error::{DogmaError, Result};
use crate::features::object_store::{Blob, EntryMode, Hash, ObjectStore, Tree, TreeEntry};

#[derive(Debug, Clone, Default)]
pub struct WorkingTree {
    entries: BTreeMap<String, Entry>,
}

impl WorkingTree {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub async fn load(
        store: &dyn ObjectStore,
        root: Option<Hash>,
        revision: Revision,
    ) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if let Some(hash) = root {
            load_node(store, hash, String::new(), &mut entries, revision).await?;
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn contains_directory(&self, path: &str) -> bool {
        path::is_root(path) || self.entries.keys().any(|p| p != path && path::is_under(p, path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path) || self.contains_directory(path)
    }

    pub fn paths_under(&self, path: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|p| path::is_under(p, path))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    pub fn upsert(&mut self, path: &str, entry_type: EntryType, content: EntryContent, revision: Revision) {
        self.entries.insert(
            path.to_string(),
            Entry {
                path: path.to_string(),
                entry_type,
                content,
                revision,
            },
        );
    }

    /// Remove a file or every entry nested under a directory path.
    /// Returns the removed paths.
    pub fn remove_subtree(&mut self, path: &str) -> Vec<String> {
        let victims = self.paths_under(path);
        for victim in &victims {
            self.entries.remove(victim);
        }
        victims
    }

    /// Move `src` (file or directory) to `dest`, preserving relative
    /// structure for directory renames. Returns the `(old, new)` path
    /// pairs moved.
    pub fn rename_subtree(&mut self, src: &str, dest: &str) -> Vec<(String, String)> {
        let victims = self.paths_under(src);
        let mut moved = Vec::with_capacity(victims.len());
        for old_path in victims {
            let new_path = if old_path == src {
                dest.to_string()
            } else {
                format!("{dest}{}", &old_path[src.len()..])
            };
            if let Some(mut entry) = self.entries.remove(&old_path) {
                entry.path = new_path.clone();
                self.entries.insert(new_path.clone(), entry);
            }
            moved.push((old_path, new_path));
        }
        moved
    }

    pub async fn persist(&self, store: &dyn ObjectStore) -> Result<Hash> {
        let nested = build_nested(&self.entries);
        persist_node(store, &nested).await
    }
}

enum Node {
    File(Entry),
    Dir(BTreeMap<String, Node>),
}

fn build_nested(entries: &BTreeMap<String, Entry>) -> BTreeMap<String, Node> {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    for entry in entries.values() {
        let segments: Vec<&str> = entry.path.trim_start_matches('/').split('/').collect();
        insert_segments(&mut root, &segments, entry.clone());
    }
    root
}

fn insert_segments(map: &mut BTreeMap<String, Node>, segments: &[&str], entry: Entry) {
    if segments.len() == 1 {
        map.insert(segments[0].to_string(), Node::File(entry));
        return;
    }
    let head = segments[0].to_string();
    let node = map.entry(head).or_insert_with(|| Node::Dir(BTreeMap::new()));
    if let Node::Dir(sub) = node {
        insert_segments(sub, &segments[1..], entry);
    }
}

fn persist_node<'a>(
    store: &'a dyn ObjectStore,
    node: &'a BTreeMap<String, Node>,
) -> Pin<Box<dyn Future<Output = Result<Hash>> + Send + 'a>> {
    Box::pin(async move {
        let mut tree_entries = Vec::with_capacity(node.len());
        for (name, child) in node {
            match child {
                Node::File(entry) => {
                    let bytes = entry.canonical_bytes().unwrap_or_default();
                    let blob = Blob::new(bytes);
                    let hash = blob.hash();
                    store.put(hash, blob.canonical_bytes()).await?;
                    tree_entries.push(TreeEntry {
                        name: name.clone(),
                        mode: EntryMode::File,
                        hash,
                    });
                }
                Node::Dir(sub) => {
                    let hash = persist_node(store, sub).await?;
                    tree_entries.push(TreeEntry {
                        name: name.clone(),
                        mode: EntryMode::Directory,
                        hash,
                    });
                }
            }
        }
        let tree = Tree::new(tree_entries);
        let bytes = tree.canonical_bytes();
        let hash = tree.hash();
        store.put(hash, bytes).await?;
        Ok(hash)
    })
}

fn load_node<'a>(
    store: &'a dyn ObjectStore,
    hash: Hash,
    prefix: String,
    entries: &'a mut BTreeMap<String, Entry>,
    revision: Revision,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let bytes = store
            .get(hash)
            .await?
            .ok_or_else(|| DogmaError::Storage(format!("tree object {hash} missing")))?;
        let tree = Tree::parse(&bytes)
            .ok_or_else(|| DogmaError::Storage(format!("tree object {hash} is corrupt")))?;
        for child in tree.entries {
            let path = format!("{prefix}/{}", child.name);
            match child.mode {
                EntryMode::Directory => {
                    load_node(store, child.hash, path, entries, revision).await?;
                }
                EntryMode::File => {
                    let blob_bytes = store.get(child.hash).await?.ok_or_else(|| {
                        DogmaError::Storage(format!("blob object {} missing", child.hash))
                    })?;
                    let blob = Blob::parse(&blob_bytes).ok_or_else(|| {
                        DogmaError::Storage(format!("blob object {} is corrupt", child.hash))
                    })?;
                    let entry_type = EntryType::infer_from_path(&path);
                    let content = decode_entry_content(entry_type, &blob.data)?;
                    entries.insert(
                        path.clone(),
                        Entry {
                            path,
                            entry_type,
                            content,
                            revision,
                        },
                    );
                }
            }
        }
        Ok(())
    })
}

fn decode_entry_content(entry_type: EntryType, bytes: &[u8]) -> Result<EntryContent> {
    match entry_type {
        EntryType::Json => {
            let value = serde_json::from_slice(bytes)?;
            Ok(EntryContent::Json(value))
        }
        EntryType::Yaml => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| DogmaError::Storage(format!("non-utf8 yaml entry: {e}")))?;
            let value = serde_yaml::from_str(text)
                .map_err(|e| DogmaError::Storage(format!("malformed yaml entry: {e}")))?;
            Ok(EntryContent::Json(value))
        }
        EntryType::Text => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| DogmaError::Storage(format!("non-utf8 text entry: {e}")))?;
            Ok(EntryContent::Text(text))
        }
        EntryType::Directory => Ok(EntryContent::Directory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::object_store::FilesystemObjectStore;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_nested_tree_through_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::open(dir.path()).await.unwrap();

        let mut tree = WorkingTree::empty();
        tree.upsert(
            "/a.json",
            EntryType::Json,
            EntryContent::Json(json!({"foo": "bar"})),
            Revision::new(1),
        );
        tree.upsert(
            "/nested/b.txt",
            EntryType::Text,
            EntryContent::Text("hello\n".into()),
            Revision::new(1),
        );

        let root_hash = tree.persist(&store).await.unwrap();
        let loaded = WorkingTree::load(&store, Some(root_hash), Revision::new(1))
            .await
            .unwrap();

        assert_eq!(loaded.get("/a.json").unwrap().as_json().unwrap(), &json!({"foo": "bar"}));
        assert_eq!(loaded.get("/nested/b.txt").unwrap().as_text().unwrap(), "hello\n");
    }

    #[test]
    fn rename_moves_every_descendant() {
        let mut tree = WorkingTree::empty();
        tree.upsert("/a/x.txt", EntryType::Text, EntryContent::Text("x".into()), Revision::new(1));
        tree.upsert("/a/y.txt", EntryType::Text, EntryContent::Text("y".into()), Revision::new(1));
        let moved = tree.rename_subtree("/a", "/b");
        assert_eq!(moved.len(), 2);
        assert!(tree.get("/b/x.txt").is_some());
        assert!(tree.get("/b/y.txt").is_some());
        assert!(tree.get("/a/x.txt").is_none());
    }
}
