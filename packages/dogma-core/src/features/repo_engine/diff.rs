//! Tree-to-tree diffing (§4.C "Diff and history"): add/modify/remove/
//! rename classification between two working-tree snapshots.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{Entry, EntryType, PathPattern};

use super::domain::{entry_diff_content, DiffContent, DiffEntry};
use super::working_tree::WorkingTree;

fn entries_equal(a: &Entry, b: &Entry) -> bool {
    a.entry_type == b.entry_type && a.canonical_bytes() == b.canonical_bytes()
}

/// Diff `old` against `new`, restricted to paths matching `pattern`.
/// Renames are detected by exact content match between a path only in
/// `old` and a path only in `new` of the same entry type — a git-style
/// heuristic, not a caller-declared rename.
pub fn diff_trees(old: &WorkingTree, new: &WorkingTree, pattern: &PathPattern) -> Vec<DiffEntry> {
    let old_map: BTreeMap<&str, &Entry> = old.iter().map(|(p, e)| (p.as_str(), e)).collect();
    let new_map: BTreeMap<&str, &Entry> = new.iter().map(|(p, e)| (p.as_str(), e)).collect();

    let mut removed: Vec<&str> = old_map.keys().filter(|p| !new_map.contains_key(*p)).copied().collect();
    let mut added: Vec<&str> = new_map.keys().filter(|p| !old_map.contains_key(*p)).copied().collect();
    let common: Vec<&str> = old_map.keys().filter(|p| new_map.contains_key(*p)).copied().collect();

    let mut entries = Vec::new();
    let mut renames = Vec::new();

    removed.retain(|removed_path| {
        let removed_entry = old_map[removed_path];
        let removed_bytes = removed_entry.canonical_bytes();
        if let Some(pos) = added.iter().position(|added_path| {
            let added_entry = new_map[added_path];
            added_entry.entry_type == removed_entry.entry_type
                && added_entry.canonical_bytes() == removed_bytes
        }) {
            let added_path = added.remove(pos);
            renames.push((*removed_path, added_path));
            false
        } else {
            true
        }
    });

    for (from, to) in renames {
        if pattern.matches(from) || pattern.matches(to) {
            entries.push(DiffEntry::Rename {
                path: from.to_string(),
                destination: to.to_string(),
            });
        }
    }

    for path in removed {
        if pattern.matches(path) {
            entries.push(DiffEntry::Remove { path: path.to_string() });
        }
    }

    for path in added {
        if pattern.matches(path) {
            let entry = new_map[path];
            entries.push(DiffEntry::Add {
                path: path.to_string(),
                entry_type: entry.entry_type,
                content: entry_diff_content(entry),
            });
        }
    }

    for path in common {
        if !pattern.matches(path) {
            continue;
        }
        let old_entry = old_map[path];
        let new_entry = new_map[path];
        if entries_equal(old_entry, new_entry) {
            continue;
        }
        let patch = match new_entry.entry_type {
            EntryType::Json | EntryType::Yaml => {
                let old_json = old_entry.as_json().cloned().unwrap_or(Value::Null);
                let new_json = new_entry.as_json().cloned().unwrap_or(Value::Null);
                DiffContent::Json(crate::features::patch::safe_diff_json(&old_json, &new_json))
            }
            EntryType::Text => {
                let old_text = old_entry.as_text().unwrap_or_default();
                let new_text = new_entry.as_text().unwrap_or_default();
                DiffContent::Text(crate::features::patch::diff_text(old_text, new_text))
            }
            EntryType::Directory => continue,
        };
        entries.push(DiffEntry::Modify {
            path: path.to_string(),
            entry_type: new_entry.entry_type,
            patch,
        });
    }

    entries.sort_by(|a, b| a.path().cmp(b.path()));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryContent, Revision};

    #[test]
    fn identical_trees_diff_to_nothing() {
        let mut tree = WorkingTree::empty();
        tree.upsert("/a.txt", EntryType::Text, EntryContent::Text("x\n".into()), Revision::new(1));
        let diff = diff_trees(&tree, &tree.clone(), &PathPattern::all());
        assert!(diff.is_empty());
    }

    #[test]
    fn detects_add_modify_remove() {
        let mut old = WorkingTree::empty();
        old.upsert("/keep.txt", EntryType::Text, EntryContent::Text("same\n".into()), Revision::new(1));
        old.upsert("/gone.txt", EntryType::Text, EntryContent::Text("bye\n".into()), Revision::new(1));
        old.upsert("/change.txt", EntryType::Text, EntryContent::Text("old\n".into()), Revision::new(1));

        let mut new = WorkingTree::empty();
        new.upsert("/keep.txt", EntryType::Text, EntryContent::Text("same\n".into()), Revision::new(2));
        new.upsert("/change.txt", EntryType::Text, EntryContent::Text("new\n".into()), Revision::new(2));
        new.upsert("/added.txt", EntryType::Text, EntryContent::Text("fresh\n".into()), Revision::new(2));

        let diff = diff_trees(&old, &new, &PathPattern::all());
        let paths: Vec<&str> = diff.iter().map(|d| d.path()).collect();
        assert!(paths.contains(&"/gone.txt"));
        assert!(paths.contains(&"/change.txt"));
        assert!(paths.contains(&"/added.txt"));
        assert!(!paths.contains(&"/keep.txt"));
    }

    #[test]
    fn detects_rename_via_identical_content() {
        let mut old = WorkingTree::empty();
        old.upsert("/old.txt", EntryType::Text, EntryContent::Text("same\n".into()), Revision::new(1));
        let mut new = WorkingTree::empty();
        new.upsert("/new.txt", EntryType::Text, EntryContent::Text("same\n".into()), Revision::new(2));

        let diff = diff_trees(&old, &new, &PathPattern::all());
        assert_eq!(diff.len(), 1);
        matches!(&diff[0], DiffEntry::Rename { path, destination } if path == "/old.txt" && destination == "/new.txt");
    }

    #[test]
    fn pattern_restricts_which_paths_are_reported() {
        let mut old = WorkingTree::empty();
        let mut new = WorkingTree::empty();
        new.upsert("/a/x.txt", EntryType::Text, EntryContent::Text("x\n".into()), Revision::new(2));
        new.upsert("/b/y.txt", EntryType::Text, EntryContent::Text("y\n".into()), Revision::new(2));
        let _ = &old;
        let diff = diff_trees(&old, &new, &PathPattern::parse("/a/**").unwrap());
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path(), "/a/x.txt");
    }
}
