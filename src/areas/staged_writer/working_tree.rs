//! Mutable view of a tree while it is being staged
//!
//! Nodes live in an arena and refer to each other by index. Directories
//! keep their children in a name-ordered map and every live node is also
//! reachable through a path index, so lookups never walk the tree and
//! direct-children listings never slice strings.
//!
//! A directory is dirty when something below it changed since its hash was
//! last computed. Removing a node marks its former ancestors dirty; the
//! removed nodes stay in the arena as tombstones.

use crate::artifacts::objects::entry_mode::MODE_DIRECTORY;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::FlatTree;
use crate::error::GitError;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub name: String,
    pub path: String,
    pub parent: Option<NodeId>,
    pub mode: u32,
    /// Last known hash; stale while a directory is dirty
    pub hash: ObjectId,
    children: Option<BTreeMap<String, NodeId>>,
    pub dirty: bool,
    live: bool,
}

impl Node {
    pub fn is_directory(&self) -> bool {
        self.children.is_some()
    }

    fn depth(&self) -> usize {
        if self.path.is_empty() { 0 } else { self.path.split('/').count() }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WorkingTree {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
}

impl WorkingTree {
    /// A tree holding nothing but its root
    pub fn new(root_hash: ObjectId) -> Self {
        let root = Node {
            name: String::new(),
            path: String::new(),
            parent: None,
            mode: MODE_DIRECTORY,
            hash: root_hash,
            children: Some(BTreeMap::new()),
            dirty: false,
            live: true,
        };

        WorkingTree {
            nodes: vec![root],
            index: HashMap::from([(String::new(), ROOT)]),
        }
    }

    /// Load a recursive listing; parents must precede their children
    pub fn from_flat_tree(tree: &FlatTree) -> anyhow::Result<Self> {
        let mut working = WorkingTree::new(tree.hash);

        for entry in &tree.entries {
            let (parent_path, name) = split_parent(&entry.path);
            let parent = working
                .directory_at(parent_path)
                .ok_or_else(|| GitError::PathNotFound {
                    path: parent_path.to_string(),
                })?;
            working.attach(parent, name, entry.mode, entry.hash, entry.is_tree());
        }

        Ok(working)
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Direct children of a directory, in name order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id]
            .children
            .iter()
            .flat_map(|children| children.values().copied())
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.nodes[id]
            .children
            .as_ref()
            .is_some_and(|children| !children.is_empty())
    }

    /// Number of files and directories below the root
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    /// Add a file, creating missing parent directories
    pub fn insert_file(&mut self, path: &str, mode: u32, hash: ObjectId) -> anyhow::Result<NodeId> {
        let (parent_path, name) = split_parent(path);
        let parent = self.ensure_directories(parent_path)?;
        let id = self.attach(parent, name, mode, hash, false);
        self.mark_ancestors_dirty(id);

        Ok(id)
    }

    /// Point an existing file at new content
    pub fn set_file(&mut self, id: NodeId, mode: u32, hash: ObjectId) {
        let node = &mut self.nodes[id];
        node.mode = mode;
        node.hash = hash;
        self.mark_ancestors_dirty(id);
    }

    /// Detach a node and everything below it
    pub fn remove(&mut self, id: NodeId) {
        self.mark_ancestors_dirty(id);
        self.detach(id);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            stack.extend(self.children(current));
            let node = &mut self.nodes[current];
            node.live = false;
            self.index.remove(&node.path);
        }
    }

    /// Drop everything below the root
    pub fn clear(&mut self) {
        let children = self.children(ROOT).collect::<Vec<_>>();
        for child in children {
            self.remove(child);
        }
        self.nodes[ROOT].dirty = true;
    }

    /// Move a node and everything below it to `path`
    ///
    /// `path` must be free and must not lie inside the moved subtree.
    pub fn relocate(&mut self, id: NodeId, path: &str) -> anyhow::Result<()> {
        let (parent_path, name) = split_parent(path);
        let parent = self.ensure_directories(parent_path)?;

        self.mark_ancestors_dirty(id);
        self.detach(id);

        self.nodes[id].name = name.to_string();
        self.nodes[id].parent = Some(parent);
        if let Some(children) = &mut self.nodes[parent].children {
            children.insert(name.to_string(), id);
        }

        let mut stack = vec![(id, path.to_string())];
        while let Some((current, new_path)) = stack.pop() {
            let old_path = std::mem::replace(&mut self.nodes[current].path, new_path.clone());
            self.index.remove(&old_path);
            self.index.insert(new_path.clone(), current);

            for child in self.children(current).collect::<Vec<_>>() {
                stack.push((child, format!("{new_path}/{}", self.nodes[child].name)));
            }
        }

        self.mark_ancestors_dirty(id);
        Ok(())
    }

    /// Dirty directories, deepest first and by path within one depth
    pub fn dirty_directories(&self) -> Vec<NodeId> {
        let mut dirty = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.live && node.dirty && node.is_directory())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        dirty.sort_by(|a, b| {
            let (a, b) = (&self.nodes[*a], &self.nodes[*b]);
            (Reverse(a.depth()), &a.path).cmp(&(Reverse(b.depth()), &b.path))
        });
        dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.nodes[ROOT].dirty
    }

    /// Record the hash a dirty directory was built to
    pub fn mark_built(&mut self, id: NodeId, hash: ObjectId) {
        let node = &mut self.nodes[id];
        node.hash = hash;
        node.dirty = false;
    }

    fn directory_at(&self, path: &str) -> Option<NodeId> {
        self.lookup(path)
            .filter(|id| self.nodes[*id].is_directory())
    }

    fn ensure_directories(&mut self, path: &str) -> anyhow::Result<NodeId> {
        let mut current = ROOT;
        if path.is_empty() {
            return Ok(current);
        }

        for component in path.split('/') {
            let existing = self.nodes[current]
                .children
                .as_ref()
                .and_then(|children| children.get(component).copied());

            current = match existing {
                Some(id) if self.nodes[id].is_directory() => id,
                Some(id) => {
                    return Err(GitError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("{:?} is a file", self.nodes[id].path),
                    }
                    .into());
                }
                None => self.attach(current, component, MODE_DIRECTORY, ObjectId::ZERO, true),
            };
        }

        Ok(current)
    }

    fn attach(&mut self, parent: NodeId, name: &str, mode: u32, hash: ObjectId, directory: bool) -> NodeId {
        let path = match self.nodes[parent].path.as_str() {
            "" => name.to_string(),
            parent_path => format!("{parent_path}/{name}"),
        };

        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            path: path.clone(),
            parent: Some(parent),
            mode,
            hash,
            children: directory.then(BTreeMap::new),
            dirty: false,
            live: true,
        });
        self.index.insert(path, id);
        if let Some(children) = &mut self.nodes[parent].children {
            children.insert(name.to_string(), id);
        }

        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            let name = self.nodes[id].name.clone();
            if let Some(children) = &mut self.nodes[parent].children {
                children.remove(&name);
            }
        }
    }

    fn mark_ancestors_dirty(&mut self, id: NodeId) {
        let mut current = self.nodes[id].parent;
        while let Some(parent) = current {
            self.nodes[parent].dirty = true;
            current = self.nodes[parent].parent;
        }
    }
}

/// `a/b/c` splits into `a/b` and `c`; top-level names have an empty parent
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::MODE_REGULAR;
    use crate::artifacts::objects::tree::FlatTreeEntry;
    use pretty_assertions::assert_eq;

    fn oid(seed: &str) -> ObjectId {
        ObjectId::hash_object("blob", seed.as_bytes())
    }

    fn paths(tree: &WorkingTree, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| tree.node(*id).path.clone()).collect()
    }

    #[test]
    fn inserting_a_file_creates_and_dirties_its_ancestors() {
        let mut tree = WorkingTree::new(ObjectId::ZERO);

        tree.insert_file("a/b/c.txt", MODE_REGULAR, oid("c")).unwrap();

        assert!(tree.lookup("a").is_some());
        assert!(tree.node(tree.lookup("a/b").unwrap()).is_directory());
        assert_eq!(
            paths(&tree, &tree.dirty_directories()),
            vec!["a/b", "a", ""]
        );
    }

    #[test]
    fn a_file_cannot_be_used_as_a_directory() {
        let mut tree = WorkingTree::new(ObjectId::ZERO);
        tree.insert_file("a", MODE_REGULAR, oid("a")).unwrap();

        let err = tree.insert_file("a/b", MODE_REGULAR, oid("b")).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<GitError>(),
            Some(GitError::InvalidPath { .. })
        ));
    }

    #[test]
    fn dirty_directories_are_ordered_deepest_first_then_by_path() {
        let mut tree = WorkingTree::new(ObjectId::ZERO);
        tree.insert_file("z/x/1", MODE_REGULAR, oid("1")).unwrap();
        tree.insert_file("b/2", MODE_REGULAR, oid("2")).unwrap();
        tree.insert_file("a/y/3", MODE_REGULAR, oid("3")).unwrap();

        assert_eq!(
            paths(&tree, &tree.dirty_directories()),
            vec!["a/y", "z/x", "a", "b", "z", ""]
        );
    }

    #[test]
    fn relocating_rewrites_every_descendant_path() {
        let mut tree = WorkingTree::new(ObjectId::ZERO);
        tree.insert_file("src/lib/a.rs", MODE_REGULAR, oid("a")).unwrap();
        tree.insert_file("src/lib/b.rs", MODE_REGULAR, oid("b")).unwrap();
        let lib = tree.lookup("src/lib").unwrap();

        tree.relocate(lib, "pkg/core").unwrap();

        assert_eq!(tree.lookup("src/lib"), None);
        assert_eq!(tree.lookup("src/lib/a.rs"), None);
        assert!(tree.lookup("pkg/core/a.rs").is_some());
        assert!(tree.lookup("pkg/core/b.rs").is_some());
        assert_eq!(tree.node(lib).name, "core");
        assert!(!tree.has_children(tree.lookup("src").unwrap()));
    }

    #[test]
    fn removing_a_directory_drops_its_whole_subtree() {
        let mut tree = WorkingTree::new(ObjectId::ZERO);
        tree.insert_file("docs/a.md", MODE_REGULAR, oid("a")).unwrap();
        tree.insert_file("docs/deep/b.md", MODE_REGULAR, oid("b")).unwrap();
        tree.insert_file("keep.txt", MODE_REGULAR, oid("k")).unwrap();

        tree.remove(tree.lookup("docs").unwrap());

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.lookup("docs/deep/b.md"), None);
        assert!(tree.dirty_directories().iter().all(|id| tree.node(*id).path.is_empty()));
    }

    #[test]
    fn loaded_listing_starts_clean() {
        let listing = FlatTree {
            hash: oid("root"),
            entries: vec![
                FlatTreeEntry::directory("src", oid("src")),
                FlatTreeEntry::new("src/main.rs", MODE_REGULAR, oid("main")),
                FlatTreeEntry::new("README.md", MODE_REGULAR, oid("readme")),
            ],
        };

        let tree = WorkingTree::from_flat_tree(&listing).unwrap();

        assert_eq!(tree.len(), 3);
        assert!(!tree.is_dirty());
        assert_eq!(tree.node(tree.root()).hash, oid("root"));
        let children = tree
            .children(tree.root())
            .map(|id| tree.node(id).name.clone())
            .collect::<Vec<_>>();
        assert_eq!(children, vec!["README.md", "src"]);
    }
}
