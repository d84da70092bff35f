//! Git tree object
//!
//! Trees represent directory snapshots in Git. They contain entries for files (blobs)
//! and subdirectories (other trees), along with their names and modes.
//!
//! ## Format
//!
//! Payload: a sequence of entries, each `<mode> <name>\0<20-byte-sha1>`.
//! Entries are ordered by name, comparing directory names as if they ended
//! with `/`, which is what makes a tree hash canonical.
//!
//! ## Views
//!
//! - [`Tree`]: the direct children of one directory
//! - [`FlatTree`]: the full recursive listing, every entry keyed by its path

use crate::artifacts::objects::entry_mode::{self, MODE_DIRECTORY};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

/// One entry of a tree object as decoded from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileTreeEntry {
    pub mode: u32,
    pub name: String,
    pub hash: ObjectId,
}

impl PackfileTreeEntry {
    pub fn new(mode: u32, name: impl Into<String>, hash: ObjectId) -> Self {
        PackfileTreeEntry {
            mode,
            name: name.into(),
            hash,
        }
    }

    pub fn is_directory(&self) -> bool {
        entry_mode::is_directory(self.mode)
    }

    pub fn object_type(&self) -> ObjectType {
        entry_mode::object_type_for_mode(self.mode)
    }
}

/// Git's canonical tree entry order
pub fn tree_entry_order(a: &PackfileTreeEntry, b: &PackfileTreeEntry) -> Ordering {
    let a_name = a.name.as_bytes().iter().chain(a.is_directory().then_some(&b'/'));
    let b_name = b.name.as_bytes().iter().chain(b.is_directory().then_some(&b'/'));

    a_name.cmp(b_name)
}

/// Serialize tree entries into a tree payload, sorting them canonically
pub fn serialize_tree(entries: &[PackfileTreeEntry]) -> anyhow::Result<Bytes> {
    let mut sorted = entries.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| tree_entry_order(a, b));

    let mut payload = Vec::new();
    for entry in sorted {
        write!(payload, "{:o} {}", entry.mode, entry.name)?;
        payload.push(0);
        entry.hash.write_binary_to(&mut payload)?;
    }

    Ok(Bytes::from(payload))
}

/// Parse a tree payload into its entries, in stored order
pub fn deserialize_tree(payload: &[u8]) -> anyhow::Result<Vec<PackfileTreeEntry>> {
    let mut entries = Vec::new();
    let mut reader = payload;

    // Reuse scratch buffers to reduce allocs
    let mut mode_bytes = Vec::new();
    let mut name_bytes = Vec::new();

    loop {
        mode_bytes.clear();
        // Read "mode " (space-delimited)
        let n = reader.read_until(b' ', &mut mode_bytes)?;
        if n == 0 {
            break; // clean EOF: no more entries
        }
        if mode_bytes.pop() != Some(b' ') {
            return Err(anyhow::anyhow!("unexpected EOF in mode"));
        }
        let mode = entry_mode::parse_octal(std::str::from_utf8(&mode_bytes)?)?;

        // Read "name\0"
        name_bytes.clear();
        reader.read_until(b'\0', &mut name_bytes)?;
        if name_bytes.pop() != Some(b'\0') {
            return Err(anyhow::anyhow!("unexpected EOF in name"));
        }
        let name = std::str::from_utf8(&name_bytes)
            .with_context(|| {
                format!("tree entry name is not UTF-8: {:?}", String::from_utf8_lossy(&name_bytes))
            })?
            .to_owned();

        let hash = ObjectId::read_binary_from(&mut reader).context("unexpected EOF in object id")?;

        entries.push(PackfileTreeEntry { mode, name, hash });
    }

    Ok(entries)
}

/// A direct child of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: u32,
    pub hash: ObjectId,
    pub object_type: ObjectType,
}

impl From<&PackfileTreeEntry> for TreeEntry {
    fn from(entry: &PackfileTreeEntry) -> Self {
        TreeEntry {
            name: entry.name.clone(),
            mode: entry.mode,
            hash: entry.hash,
            object_type: entry.object_type(),
        }
    }
}

/// One directory level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub hash: ObjectId,
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// An entry of a recursive listing, addressed from the repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTreeEntry {
    pub name: String,
    pub path: String,
    pub mode: u32,
    pub hash: ObjectId,
    pub object_type: ObjectType,
}

impl FlatTreeEntry {
    pub fn new(path: impl Into<String>, mode: u32, hash: ObjectId) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();

        FlatTreeEntry {
            name,
            path,
            mode,
            hash,
            object_type: entry_mode::object_type_for_mode(mode),
        }
    }

    pub fn directory(path: impl Into<String>, hash: ObjectId) -> Self {
        Self::new(path, MODE_DIRECTORY, hash)
    }

    pub fn is_blob(&self) -> bool {
        self.object_type == ObjectType::Blob
    }

    pub fn is_tree(&self) -> bool {
        self.object_type == ObjectType::Tree
    }
}

/// Full recursive listing of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTree {
    /// Hash of the root tree that was flattened
    pub hash: ObjectId,
    pub entries: Vec<FlatTreeEntry>,
}

impl FlatTree {
    /// Blob entries, i.e. the files a checkout would contain
    pub fn files(&self) -> impl Iterator<Item = &FlatTreeEntry> {
        self.entries.iter().filter(|entry| entry.is_blob())
    }

    pub fn get(&self, path: &str) -> Option<&FlatTreeEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::{MODE_EXECUTABLE, MODE_REGULAR};
    use pretty_assertions::assert_eq;

    fn oid(seed: &str) -> ObjectId {
        ObjectId::hash_object("blob", seed.as_bytes())
    }

    #[test]
    fn serializes_entries_in_git_order() {
        let entries = vec![
            PackfileTreeEntry::new(MODE_REGULAR, "foo.txt", oid("a")),
            PackfileTreeEntry::new(MODE_DIRECTORY, "foo", oid("b")),
            PackfileTreeEntry::new(MODE_REGULAR, "foo-bar", oid("c")),
        ];

        let parsed = deserialize_tree(&serialize_tree(&entries).unwrap()).unwrap();
        let names = parsed.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();

        // "foo" sorts as "foo/", after "foo-bar" and "foo.txt"
        assert_eq!(names, vec!["foo-bar", "foo.txt", "foo"]);
    }

    #[test]
    fn empty_tree_hashes_like_git() {
        let payload = serialize_tree(&[]).unwrap();

        assert_eq!(
            ObjectId::hash_object("tree", &payload).to_string(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn deserializes_modes_and_hashes() {
        let entries = vec![
            PackfileTreeEntry::new(MODE_EXECUTABLE, "run.sh", oid("x")),
            PackfileTreeEntry::new(MODE_DIRECTORY, "src", oid("y")),
        ];

        let parsed = deserialize_tree(&serialize_tree(&entries).unwrap()).unwrap();

        assert_eq!(parsed, entries);
        assert_eq!(parsed[1].object_type(), ObjectType::Tree);
    }

    #[test]
    fn rejects_truncated_payloads() {
        let payload = serialize_tree(&[PackfileTreeEntry::new(MODE_REGULAR, "a", oid("a"))]).unwrap();

        assert!(deserialize_tree(&payload[..payload.len() - 3]).is_err());
        assert!(deserialize_tree(b"100644 name-without-nul").is_err());
    }

    #[test]
    fn non_utf8_names_are_reported() {
        let mut payload = b"100644 caf\xe9.txt\0".to_vec();
        payload.extend_from_slice(oid("a").as_bytes());

        let err = deserialize_tree(&payload).unwrap_err();

        assert!(format!("{err:#}").contains("not UTF-8"));
    }

    #[test]
    fn flat_entry_derives_name_and_type_from_path_and_mode() {
        let entry = FlatTreeEntry::new("docs/guide/intro.md", MODE_REGULAR, oid("d"));

        assert_eq!(entry.name, "intro.md");
        assert!(entry.is_blob());
        assert!(FlatTreeEntry::directory("docs", oid("e")).is_tree());
    }
}
