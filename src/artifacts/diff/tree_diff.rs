use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{FlatTree, FlatTreeEntry};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn status_char(&self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
        }
    }
}

/// One changed path between two commits
///
/// The `old_*` fields describe the base side and are zero for additions;
/// `mode` and `hash` describe the head side and are zero for deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub path: String,
    pub mode: u32,
    pub old_mode: u32,
    pub hash: ObjectId,
    pub old_hash: ObjectId,
    pub status: FileStatus,
}

impl CommitFile {
    fn added(entry: &FlatTreeEntry) -> Self {
        CommitFile {
            path: entry.path.clone(),
            mode: entry.mode,
            old_mode: 0,
            hash: entry.hash,
            old_hash: ObjectId::ZERO,
            status: FileStatus::Added,
        }
    }

    fn deleted(entry: &FlatTreeEntry) -> Self {
        CommitFile {
            path: entry.path.clone(),
            mode: 0,
            old_mode: entry.mode,
            hash: ObjectId::ZERO,
            old_hash: entry.hash,
            status: FileStatus::Deleted,
        }
    }

    fn modified(old: &FlatTreeEntry, new: &FlatTreeEntry) -> Self {
        CommitFile {
            path: new.path.clone(),
            mode: new.mode,
            old_mode: old.mode,
            hash: new.hash,
            old_hash: old.hash,
            status: FileStatus::Modified,
        }
    }
}

/// Compare two flat trees entry by entry
///
/// A path missing from `base` is added, a path missing from `head` is
/// deleted, and a path whose hash changed is modified unless either side
/// is a directory (a directory's hash changes whenever any file below it
/// does, which the per-file records already cover). The result is sorted
/// by path.
pub fn compare_flat_trees(base: &FlatTree, head: &FlatTree) -> Vec<CommitFile> {
    let base_entries = index_by_path(base);
    let head_entries = index_by_path(head);
    let mut changes = BTreeMap::new();

    for (path, new) in &head_entries {
        match base_entries.get(path) {
            None => {
                changes.insert(*path, CommitFile::added(new));
            }
            Some(old) if old.hash != new.hash && !old.is_tree() && !new.is_tree() => {
                changes.insert(*path, CommitFile::modified(old, new));
            }
            Some(_) => {}
        }
    }

    for (path, old) in &base_entries {
        if !head_entries.contains_key(path) {
            changes.insert(*path, CommitFile::deleted(old));
        }
    }

    changes.into_values().collect()
}

fn index_by_path(tree: &FlatTree) -> BTreeMap<&str, &FlatTreeEntry> {
    tree.entries
        .iter()
        .map(|entry| (entry.path.as_str(), entry))
        .collect()
}
