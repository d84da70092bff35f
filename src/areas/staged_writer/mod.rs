//! Staged writes against one ref
//!
//! A [`StagedWriter`] starts from the tree of the commit a ref points at
//! and records blob and tree changes in memory. New blobs are staged into
//! a packfile immediately; tree objects are only built when a commit is
//! made, deepest directory first, and only for directories that changed.
//! A push sends every staged object in one `receive-pack` exchange and
//! moves the ref from the hash the session started with to the last
//! commit.
//!
//! ## Lifecycle
//!
//! ```text
//! open --(stage)*--> commit(s) --> push --> (stage again...)
//!   \________________________________________/
//!                      |
//!                   cleanup (terminal)
//! ```
//!
//! Every call after [`StagedWriter::cleanup`] fails with `WriterCleanedUp`.

mod options;
mod working_tree;

pub use options::WriterOptions;

use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::artifacts::objects::commit::{Author, Commit, Committer};
use crate::artifacts::objects::entry_mode::MODE_REGULAR;
use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::reference::{Ref, validate_ref_name};
use crate::artifacts::objects::tree::{PackfileTreeEntry, Tree, TreeEntry};
use crate::artifacts::protocol::packfile::{PackfileWriter, RefUpdate};
use crate::error::GitError;
use anyhow::Context;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, trace};
use working_tree::{NodeId, WorkingTree};

/// Capacity of the pipe between the packfile producer and the transport
const PUSH_PIPE_CAPACITY: usize = 64 * 1024;

impl Client {
    /// Open a writer session on `reference`
    ///
    /// A zero hash starts from an empty tree, which creates the ref with
    /// the first push.
    pub async fn new_staged_writer(&self, reference: Ref, options: WriterOptions) -> anyhow::Result<StagedWriter> {
        validate_ref_name(&reference.name)?;
        let store = self.store();

        let (last_commit, tree) = if reference.hash.is_zero() {
            (None, WorkingTree::new(ObjectId::ZERO))
        } else {
            let commit = self
                .load_commit(&*store, reference.hash)
                .await
                .with_context(|| format!("load head of {:?}", reference.name))?;
            let listing = self.load_flat_tree(&*store, commit.tree).await?;
            (Some(commit), WorkingTree::from_flat_tree(&listing)?)
        };

        debug!(
            ref_name = %reference.name,
            head = %reference.hash,
            entries = tree.len(),
            "staged writer opened"
        );

        Ok(StagedWriter {
            client: self.clone(),
            store,
            last_tree: last_commit.as_ref().map_or(ObjectId::ZERO, |commit| commit.tree),
            last_commit,
            reference,
            packfile: PackfileWriter::new(options.storage_mode)?,
            tree,
            unpushed_commit: false,
            tree_builds: 0,
            cleaned_up: false,
        })
    }
}

#[derive(Debug)]
pub struct StagedWriter {
    client: Client,
    store: Arc<dyn ObjectStore>,
    reference: Ref,
    packfile: PackfileWriter,
    tree: WorkingTree,
    last_commit: Option<Commit>,
    last_tree: ObjectId,
    unpushed_commit: bool,
    tree_builds: usize,
    cleaned_up: bool,
}

impl StagedWriter {
    /// The ref as the session currently knows it
    pub fn ref_(&self) -> &Ref {
        &self.reference
    }

    /// The newest commit of the session, or the ref's head before any commit
    pub fn last_commit(&self) -> Option<&Commit> {
        self.last_commit.as_ref()
    }

    pub fn last_tree(&self) -> ObjectId {
        self.last_tree
    }

    /// Tree objects built by every commit of this session
    pub fn tree_builds(&self) -> usize {
        self.tree_builds
    }

    // ========== Blobs ==========

    pub fn blob_exists(&self, path: &str) -> anyhow::Result<bool> {
        self.ensure_active()?;
        validate_path(path)?;

        Ok(self
            .tree
            .lookup(path)
            .is_some_and(|id| !self.tree.node(id).is_directory()))
    }

    /// Add a new regular file
    pub fn create_blob(&mut self, path: &str, content: impl Into<Bytes>) -> anyhow::Result<ObjectId> {
        self.ensure_active()?;
        validate_path(path)?;

        if let Some(existing) = self.tree.lookup(path) {
            return Err(GitError::ObjectAlreadyExists {
                id: self.tree.node(existing).hash,
            })
            .with_context(|| format!("create blob {path:?}"));
        }

        let blob = PackfileObject::blob(content);
        let hash = blob.hash;
        self.tree
            .insert_file(path, MODE_REGULAR, hash)
            .with_context(|| format!("create blob {path:?}"))?;
        self.stage(blob)?;

        debug!(path, hash = %hash, "blob created");
        Ok(hash)
    }

    /// Replace the content of an existing file, keeping its mode
    pub fn update_blob(&mut self, path: &str, content: impl Into<Bytes>) -> anyhow::Result<ObjectId> {
        self.ensure_active()?;
        let id = self.file_node(path).with_context(|| format!("update blob {path:?}"))?;

        let blob = PackfileObject::blob(content);
        let hash = blob.hash;
        let mode = self.tree.node(id).mode;
        self.tree.set_file(id, mode, hash);
        self.stage(blob)?;

        debug!(path, hash = %hash, "blob updated");
        Ok(hash)
    }

    pub fn delete_blob(&mut self, path: &str) -> anyhow::Result<()> {
        self.ensure_active()?;
        let id = self.file_node(path).with_context(|| format!("delete blob {path:?}"))?;

        self.tree.remove(id);

        debug!(path, "blob deleted");
        Ok(())
    }

    pub fn move_blob(&mut self, src: &str, dst: &str) -> anyhow::Result<()> {
        self.ensure_active()?;
        let context = || format!("move blob {src:?} to {dst:?}");

        validate_path(dst).with_context(context)?;
        let id = self.file_node(src).with_context(context)?;
        self.check_destination(src, dst).with_context(context)?;

        self.tree.relocate(id, dst).with_context(context)?;

        debug!(src, dst, "blob moved");
        Ok(())
    }

    // ========== Trees ==========

    /// Current view of a directory
    ///
    /// Hashes of directories changed since the last commit are computed on
    /// the fly and nothing is staged.
    pub fn get_tree(&self, path: &str) -> anyhow::Result<Tree> {
        self.ensure_active()?;
        let id = self.directory_node(path).with_context(|| format!("get tree {path:?}"))?;

        let object = PackfileObject::tree(&self.preview_entries(id)?)?;

        Ok(Tree {
            hash: object.hash,
            entries: object.tree.iter().map(TreeEntry::from).collect(),
        })
    }

    /// Remove a directory and everything below it
    ///
    /// The root (`""` or `"."`) is reset to an empty tree.
    pub fn delete_tree(&mut self, path: &str) -> anyhow::Result<()> {
        self.ensure_active()?;

        if is_root(path) {
            self.tree.clear();
            debug!("tree reset to empty root");
            return Ok(());
        }

        let id = self.directory_node(path).with_context(|| format!("delete tree {path:?}"))?;
        self.tree.remove(id);

        debug!(path, "tree deleted");
        Ok(())
    }

    pub fn move_tree(&mut self, src: &str, dst: &str) -> anyhow::Result<()> {
        self.ensure_active()?;
        let context = || format!("move tree {src:?} to {dst:?}");

        if is_root(src) || is_root(dst) {
            return Err(GitError::InvalidPath {
                path: src.to_string(),
                reason: "the root tree cannot be moved".to_string(),
            })
            .with_context(context);
        }
        validate_path(dst).with_context(context)?;
        let id = self.directory_node(src).with_context(context)?;

        if dst.starts_with(&format!("{src}/")) {
            return Err(GitError::InvalidPath {
                path: dst.to_string(),
                reason: "destination is inside the source tree".to_string(),
            })
            .with_context(context);
        }
        self.check_destination(src, dst).with_context(context)?;

        self.tree.relocate(id, dst).with_context(context)?;

        debug!(src, dst, "tree moved");
        Ok(())
    }

    // ========== Commit & push ==========

    /// Build the changed trees and stage a commit on top of the last one
    pub fn commit(&mut self, message: &str, author: &Author, committer: &Committer) -> anyhow::Result<Commit> {
        self.ensure_active()?;

        if message.is_empty() {
            return Err(GitError::EmptyCommitMessage.into());
        }
        validate_identity("author", author)?;
        validate_identity("committer", committer)?;

        if !self.tree.is_dirty() {
            return Err(GitError::NothingToCommit.into());
        }

        let root = self.build_trees().context("build trees")?;
        let parents = self.last_commit.iter().map(|commit| commit.hash).collect();
        let object = PackfileObject::commit(root, parents, author.clone(), committer.clone(), message);

        let commit = object
            .commit
            .as_ref()
            .map(|header| Commit::from_packfile(object.hash, header))
            .context("commit object without a header")?;
        self.stage(object)?;

        info!(
            ref_name = %self.reference.name,
            commit = %commit.hash,
            tree = %root,
            "commit staged"
        );
        self.last_tree = root;
        self.last_commit = Some(commit.clone());
        self.unpushed_commit = true;

        Ok(commit)
    }

    /// Send every staged object and move the ref to the last commit
    ///
    /// The packfile is streamed through an in-memory pipe while the
    /// transport reads it; whichever side fails first fails the push. The
    /// ref update names the hash the session last saw, so a concurrent
    /// change on the remote is rejected rather than overwritten.
    pub async fn push(&mut self) -> anyhow::Result<()> {
        self.ensure_active()?;

        let head = match &self.last_commit {
            Some(commit) if self.unpushed_commit && self.packfile.has_objects() => commit.hash,
            _ => return Err(GitError::NothingToPush.into()),
        };

        let ref_name = self.reference.name.clone();
        let update = RefUpdate::new(ref_name.clone(), self.reference.hash, head);
        debug!(
            ref_name = %ref_name,
            old = %update.old,
            new = %update.new,
            objects = self.packfile.object_count(),
            on_disk = self.packfile.is_on_disk(),
            "pushing"
        );

        let (mut producer, consumer) = tokio::io::duplex(PUSH_PIPE_CAPACITY);
        let packfile = &mut self.packfile;
        let client = &self.client;

        tokio::try_join!(
            async move {
                packfile
                    .write_request(&mut producer, std::slice::from_ref(&update))
                    .await
                    .context("stream packfile")
            },
            client.receive_pack(Box::new(consumer)),
        )
        .with_context(|| format!("push {ref_name:?}"))?;

        self.packfile.reset()?;
        self.reference.hash = head;
        self.unpushed_commit = false;

        info!(ref_name = %ref_name, head = %head, "push complete");
        Ok(())
    }

    /// Release staging resources; the writer is unusable afterwards
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }

        self.packfile.cleanup();
        self.tree = WorkingTree::new(ObjectId::ZERO);
        self.last_commit = None;
        self.unpushed_commit = false;
        self.cleaned_up = true;

        debug!(ref_name = %self.reference.name, "staged writer cleaned up");
    }

    // ========== Internals ==========

    fn ensure_active(&self) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Err(GitError::WriterCleanedUp.into());
        }
        Ok(())
    }

    fn stage(&mut self, object: PackfileObject) -> anyhow::Result<()> {
        if self.packfile.add_object(&object)? {
            trace!(hash = %object.hash, kind = %object.object_type, "object staged");
        }
        self.store.add(object);
        Ok(())
    }

    /// Build one tree per dirty directory, deepest first
    ///
    /// Directories left empty are dropped instead of built; only the root
    /// may be written as an empty tree.
    fn build_trees(&mut self) -> anyhow::Result<ObjectId> {
        let root = self.tree.root();

        for id in self.tree.dirty_directories() {
            if id != root && !self.tree.has_children(id) {
                trace!(path = %self.tree.node(id).path, "pruning empty directory");
                self.tree.remove(id);
                continue;
            }

            let entries = self
                .tree
                .children(id)
                .map(|child| {
                    let node = self.tree.node(child);
                    PackfileTreeEntry::new(node.mode, node.name.clone(), node.hash)
                })
                .collect::<Vec<_>>();
            let object = PackfileObject::tree(&entries)
                .with_context(|| format!("build tree {:?}", self.tree.node(id).path))?;

            trace!(path = %self.tree.node(id).path, hash = %object.hash, "tree built");
            self.tree.mark_built(id, object.hash);
            self.tree_builds += 1;
            self.stage(object)?;
        }

        Ok(self.tree.node(root).hash)
    }

    /// Entries a directory would be built from right now
    fn preview_entries(&self, id: NodeId) -> anyhow::Result<Vec<PackfileTreeEntry>> {
        let mut entries = Vec::new();

        for child in self.tree.children(id) {
            let node = self.tree.node(child);
            let hash = if node.is_directory() && node.dirty {
                let nested = self.preview_entries(child)?;
                if nested.is_empty() {
                    continue;
                }
                PackfileObject::tree(&nested)?.hash
            } else {
                node.hash
            };
            entries.push(PackfileTreeEntry::new(node.mode, node.name.clone(), hash));
        }

        Ok(entries)
    }

    fn file_node(&self, path: &str) -> anyhow::Result<NodeId> {
        validate_path(path)?;
        let id = self.tree.lookup(path).ok_or_else(|| GitError::PathNotFound {
            path: path.to_string(),
        })?;

        let node = self.tree.node(id);
        if node.is_directory() {
            return Err(GitError::UnexpectedObjectType {
                id: node.hash,
                expected: ObjectType::Blob,
                actual: ObjectType::Tree,
            }
            .into());
        }
        Ok(id)
    }

    fn directory_node(&self, path: &str) -> anyhow::Result<NodeId> {
        if is_root(path) {
            return Ok(self.tree.root());
        }
        validate_path(path)?;
        let id = self.tree.lookup(path).ok_or_else(|| GitError::PathNotFound {
            path: path.to_string(),
        })?;

        let node = self.tree.node(id);
        if !node.is_directory() {
            return Err(GitError::UnexpectedObjectType {
                id: node.hash,
                expected: ObjectType::Tree,
                actual: ObjectType::Blob,
            }
            .into());
        }
        Ok(id)
    }

    fn check_destination(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        if src == dst {
            return Err(GitError::InvalidPath {
                path: dst.to_string(),
                reason: "source and destination are the same".to_string(),
            }
            .into());
        }
        if let Some(existing) = self.tree.lookup(dst) {
            return Err(GitError::ObjectAlreadyExists {
                id: self.tree.node(existing).hash,
            }
            .into());
        }
        Ok(())
    }
}

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "."
}

/// Writer paths are exact: no leading, trailing or doubled slashes
fn validate_path(path: &str) -> anyhow::Result<()> {
    if path.is_empty() {
        return Err(GitError::EmptyPath.into());
    }

    let malformed = path
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..");
    if malformed {
        return Err(GitError::InvalidPath {
            path: path.to_string(),
            reason: "empty or relative path component".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_identity(field: &str, identity: &Author) -> anyhow::Result<()> {
    if identity.name().is_empty() || identity.email().is_empty() {
        return Err(GitError::InvalidAuthor {
            field: field.to_string(),
            reason: "missing name or email".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::MODE_EXECUTABLE;
    use crate::artifacts::protocol::memory::MemoryRemote;
    use crate::artifacts::protocol::packfile::StorageMode;
    use crate::error::error_kind;
    use chrono::{DateTime, FixedOffset};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const MAIN: &str = "refs/heads/main";

    fn at(seconds: i64) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(seconds, 0).unwrap().fixed_offset()
    }

    fn author() -> Author {
        Author::new_with_timestamp("Ada", "ada@example.com", at(1_000))
    }

    async fn open(files: &[(&'static str, &'static str)]) -> (MemoryRemote, Client, StagedWriter) {
        let remote = MemoryRemote::new();
        let head = remote
            .commit_files(MAIN, files.iter().copied(), "initial", at(1))
            .unwrap();
        let client = Client::new(remote.clone());
        let writer = client
            .new_staged_writer(Ref::new(MAIN.to_string(), head), WriterOptions::default())
            .await
            .unwrap();
        (remote, client, writer)
    }

    fn kind(err: &anyhow::Error) -> GitError {
        error_kind(err).cloned().unwrap()
    }

    // ========== Blob Tests ==========

    #[tokio::test]
    async fn create_rejects_occupied_paths() {
        let (_, _, mut writer) = open(&[("a.txt", "a"), ("dir/b.txt", "b")]).await;

        let file = writer.create_blob("a.txt", "again").unwrap_err();
        let dir = writer.create_blob("dir", "x").unwrap_err();

        assert!(kind(&file).is_already_exists());
        assert!(kind(&dir).is_already_exists());
    }

    #[tokio::test]
    async fn update_and_delete_need_an_existing_file() {
        let (_, _, mut writer) = open(&[("dir/b.txt", "b")]).await;

        let missing = writer.update_blob("nope.txt", "x").unwrap_err();
        let directory = writer.delete_blob("dir").unwrap_err();

        assert!(matches!(kind(&missing), GitError::PathNotFound { .. }));
        assert!(matches!(
            kind(&directory),
            GitError::UnexpectedObjectType {
                expected: ObjectType::Blob,
                actual: ObjectType::Tree,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_keeps_the_file_mode() {
        let remote = MemoryRemote::new();
        let tree = remote
            .insert_tree([("run.sh", MODE_EXECUTABLE, "#!/bin/sh\n")])
            .unwrap();
        let head = remote.commit_tree(MAIN, tree, "initial", at(1));
        let client = Client::new(remote);
        let mut writer = client
            .new_staged_writer(Ref::new(MAIN.to_string(), head), WriterOptions::default())
            .await
            .unwrap();

        writer.update_blob("run.sh", "#!/bin/bash\n").unwrap();

        let root = writer.get_tree("").unwrap();
        assert_eq!(root.entry("run.sh").unwrap().mode, MODE_EXECUTABLE);
    }

    #[rstest]
    #[case("a.txt", "a.txt")]
    #[case("a.txt", "b.txt")]
    #[tokio::test]
    async fn move_blob_rejects_bad_destinations(#[case] src: &str, #[case] dst: &str) {
        let (_, _, mut writer) = open(&[("a.txt", "a"), ("b.txt", "b")]).await;

        assert!(writer.move_blob(src, dst).is_err());
        assert!(writer.blob_exists("a.txt").unwrap());
    }

    #[rstest]
    #[case("/a")]
    #[case("a/")]
    #[case("a//b")]
    #[case("../a")]
    #[tokio::test]
    async fn malformed_paths_are_rejected(#[case] path: &str) {
        let (_, _, mut writer) = open(&[("a", "a")]).await;

        let err = writer.create_blob(path, "x").unwrap_err();

        assert!(matches!(kind(&err), GitError::InvalidPath { .. }));
    }

    // ========== Tree Tests ==========

    #[tokio::test]
    async fn get_tree_previews_staged_changes() {
        let (remote, client, mut writer) = open(&[("src/a.rs", "a")]).await;
        let before = writer.get_tree("src").unwrap();

        writer.create_blob("src/b.rs", "b").unwrap();
        let after = writer.get_tree("src").unwrap();

        assert_ne!(before.hash, after.hash);
        assert!(after.entry("b.rs").is_some());
        assert_eq!(writer.tree_builds(), 0);

        let commit = writer.commit("add b", &author(), &author()).unwrap();
        writer.push().await.unwrap();
        let remote_tree = client.get_tree_by_path(commit.tree, "src").await.unwrap();
        assert_eq!(remote_tree.hash, after.hash);
        assert_eq!(remote.ref_hash(MAIN), Some(commit.hash));
    }

    #[tokio::test]
    async fn move_tree_relocates_the_whole_subtree() {
        let (_, _, mut writer) = open(&[("old/a.txt", "a"), ("old/deep/b.txt", "b")]).await;
        let moved = writer.get_tree("old").unwrap().hash;

        writer.move_tree("old", "new/place").unwrap();

        assert!(writer.blob_exists("new/place/deep/b.txt").unwrap());
        assert!(!writer.blob_exists("old/a.txt").unwrap());
        assert_eq!(writer.get_tree("new/place").unwrap().hash, moved);
    }

    #[tokio::test]
    async fn move_tree_refuses_to_nest_into_itself() {
        let (_, _, mut writer) = open(&[("a/x.txt", "x")]).await;

        let err = writer.move_tree("a", "a/b").unwrap_err();

        assert!(matches!(kind(&err), GitError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn deleting_the_root_commits_an_empty_tree() {
        let (_, _, mut writer) = open(&[("a.txt", "a"), ("b/c.txt", "c")]).await;

        writer.delete_tree(".").unwrap();
        let commit = writer.commit("wipe", &author(), &author()).unwrap();

        assert_eq!(commit.tree, PackfileObject::tree(&[]).unwrap().hash);
        assert!(writer.get_tree("").unwrap().entries.is_empty());
    }

    // ========== Commit Tests ==========

    #[tokio::test]
    async fn commit_validates_before_anything_else() {
        let (_, _, mut writer) = open(&[("a", "a")]).await;
        let nameless = Author::new_with_timestamp("", "x@example.com", at(1));

        let empty = writer.commit("", &author(), &author()).unwrap_err();
        let bad_author = writer.commit("msg", &nameless, &author()).unwrap_err();
        let bad_committer = writer.commit("msg", &author(), &nameless).unwrap_err();
        let nothing = writer.commit("msg", &author(), &author()).unwrap_err();

        assert_eq!(kind(&empty), GitError::EmptyCommitMessage);
        assert!(matches!(kind(&bad_author), GitError::InvalidAuthor { field, .. } if field == "author"));
        assert!(matches!(kind(&bad_committer), GitError::InvalidAuthor { field, .. } if field == "committer"));
        assert_eq!(kind(&nothing), GitError::NothingToCommit);
    }

    #[tokio::test]
    async fn each_dirty_directory_is_built_once() {
        let (_, _, mut writer) = open(&[("keep/k.txt", "k")]).await;

        for i in 0..5 {
            writer.create_blob(&format!("pkg/file{i}.txt"), format!("{i}")).unwrap();
        }
        writer.commit("five files", &author(), &author()).unwrap();

        // pkg and the root; keep is untouched
        assert_eq!(writer.tree_builds(), 2);
    }

    #[tokio::test]
    async fn emptied_directories_are_pruned() {
        let (_, client, mut writer) = open(&[("a/b/c.txt", "c"), ("top.txt", "t")]).await;

        writer.delete_blob("a/b/c.txt").unwrap();
        let commit = writer.commit("drop c", &author(), &author()).unwrap();
        writer.push().await.unwrap();

        let listing = client.get_flat_tree(commit.hash).await.unwrap();
        let paths = listing.entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["top.txt"]);
    }

    #[tokio::test]
    async fn commits_chain_onto_each_other() {
        let (_, _, mut writer) = open(&[("a", "a")]).await;
        let head = writer.ref_().hash;

        writer.create_blob("b", "b").unwrap();
        let first = writer.commit("one", &author(), &author()).unwrap();
        writer.create_blob("c", "c").unwrap();
        let second = writer.commit("two", &author(), &author()).unwrap();

        assert_eq!(first.parent, head);
        assert_eq!(second.parent, first.hash);
        assert_eq!(writer.last_commit().unwrap().hash, second.hash);
        assert_eq!(writer.last_tree(), second.tree);
    }

    // ========== Push Tests ==========

    #[tokio::test]
    async fn push_requires_a_commit() {
        let (_, _, mut writer) = open(&[("a", "a")]).await;

        let nothing = writer.push().await.unwrap_err();
        writer.create_blob("b", "b").unwrap();
        let uncommitted = writer.push().await.unwrap_err();

        assert_eq!(kind(&nothing), GitError::NothingToPush);
        assert_eq!(kind(&uncommitted), GitError::NothingToPush);
    }

    #[rstest]
    #[case(StorageMode::Memory)]
    #[case(StorageMode::Disk)]
    #[case(StorageMode::Auto)]
    #[tokio::test]
    async fn push_advances_the_ref_in_every_storage_mode(#[case] storage_mode: StorageMode) {
        let remote = MemoryRemote::new();
        let head = remote
            .commit_files(MAIN, [("a", "a")], "initial", at(1))
            .unwrap();
        let client = Client::new(remote.clone());
        let mut writer = client
            .new_staged_writer(
                Ref::new(MAIN.to_string(), head),
                WriterOptions::default().with_storage_mode(storage_mode),
            )
            .await
            .unwrap();

        for i in 0..12 {
            writer.create_blob(&format!("dir{i}/f.txt"), format!("{i}")).unwrap();
        }
        let commit = writer.commit("many", &author(), &author()).unwrap();
        writer.push().await.unwrap();

        assert_eq!(remote.ref_hash(MAIN), Some(commit.hash));
        assert_eq!(writer.ref_().hash, commit.hash);
        assert_eq!(kind(&writer.push().await.unwrap_err()), GitError::NothingToPush);
    }

    #[tokio::test]
    async fn push_is_rejected_when_the_ref_moved() {
        let (remote, _, mut writer) = open(&[("a", "a")]).await;
        remote
            .commit_files(MAIN, [("a", "changed elsewhere")], "race", at(2))
            .unwrap();

        writer.create_blob("b", "b").unwrap();
        writer.commit("mine", &author(), &author()).unwrap();
        let err = writer.push().await.unwrap_err();

        assert!(format!("{err:#}").contains("push"));
        assert_ne!(remote.ref_hash(MAIN), Some(writer.last_commit().unwrap().hash));
    }

    #[tokio::test]
    async fn zero_ref_creates_the_branch() {
        let remote = MemoryRemote::new();
        let client = Client::new(remote.clone());
        let mut writer = client
            .new_staged_writer(
                Ref::new("refs/heads/fresh".to_string(), ObjectId::ZERO),
                WriterOptions::default(),
            )
            .await
            .unwrap();

        writer.create_blob("README.md", "hello").unwrap();
        let commit = writer.commit("first", &author(), &author()).unwrap();
        writer.push().await.unwrap();

        assert!(!commit.has_parent());
        assert_eq!(remote.ref_hash("refs/heads/fresh"), Some(commit.hash));
    }

    // ========== Cleanup Tests ==========

    #[tokio::test]
    async fn cleanup_disables_every_operation() {
        let (_, _, mut writer) = open(&[("a", "a")]).await;
        writer.create_blob("b", "b").unwrap();

        writer.cleanup();
        writer.cleanup();

        assert_eq!(kind(&writer.blob_exists("a").unwrap_err()), GitError::WriterCleanedUp);
        assert_eq!(kind(&writer.create_blob("c", "c").unwrap_err()), GitError::WriterCleanedUp);
        assert_eq!(
            kind(&writer.commit("m", &author(), &author()).unwrap_err()),
            GitError::WriterCleanedUp
        );
        assert_eq!(kind(&writer.push().await.unwrap_err()), GitError::WriterCleanedUp);
    }
}
