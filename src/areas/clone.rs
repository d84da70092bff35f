//! Partial clone into a local directory
//!
//! ## Algorithm
//!
//! 1. Resolve the commit and list its whole tree.
//! 2. Select files with the include/exclude filter.
//! 3. Download and write the selected blobs, one per fetch or in fixed-size
//!    batches, with at most `concurrency` fetches in flight. Blobs a batch
//!    response leaves out are fetched on their own afterwards.
//!
//! The first failing download stops the clone; downloads still in flight
//! are dropped.

use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::areas::workspace::Workspace;
use crate::artifacts::clone::options::{CloneOptions, CloneResult};
use crate::artifacts::clone::path_filter::PathFilter;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{FlatTree, FlatTreeEntry};
use anyhow::Context;
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashSet;
use tracing::debug;

impl Client {
    /// Materialize a filtered snapshot of a commit under `options.path`
    pub async fn clone_repository(&self, options: CloneOptions) -> anyhow::Result<CloneResult> {
        let store = self.store();
        let hash = options.hash;

        self.clone_with(&*store, options)
            .await
            .with_context(|| format!("clone {hash}"))
    }

    async fn clone_with(&self, store: &dyn ObjectStore, options: CloneOptions) -> anyhow::Result<CloneResult> {
        let filter = PathFilter::new(&options.include_paths, &options.exclude_paths)?;

        let commit = self.load_commit(store, options.hash).await?;
        let tree = self.load_flat_tree(store, commit.tree).await?;

        let total_files = tree.files().count();
        let selected = select_entries(&tree, &filter);
        let files = selected
            .iter()
            .filter(|entry| entry.is_blob())
            .cloned()
            .collect::<Vec<_>>();
        debug!(
            commit = %commit.hash,
            total_files,
            selected_files = files.len(),
            "clone filter applied"
        );

        let workspace = Workspace::new(options.path.clone().into_boxed_path());
        workspace.prepare().await?;

        if options.is_batched() {
            self.write_batched(store, &workspace, &files, &options).await?;
        } else {
            self.write_individually(store, &workspace, &files, &options).await?;
        }

        Ok(CloneResult {
            path: options.path,
            commit,
            flat_tree: FlatTree {
                hash: tree.hash,
                entries: selected,
            },
            total_files,
            filtered_files: files.len(),
        })
    }

    async fn write_individually(
        &self,
        store: &dyn ObjectStore,
        workspace: &Workspace,
        files: &[FlatTreeEntry],
        options: &CloneOptions,
    ) -> anyhow::Result<()> {
        stream::iter(files.iter().map(|entry| async move {
            let blob = self
                .load_blob(store, entry.hash)
                .await
                .with_context(|| format!("fetch {:?}", entry.path))?;
            workspace.write_file(&entry.path, &blob.content, entry.mode).await
        }))
        .buffer_unordered(options.in_flight())
        .try_collect::<Vec<()>>()
        .await?;

        Ok(())
    }

    async fn write_batched(
        &self,
        store: &dyn ObjectStore,
        workspace: &Workspace,
        files: &[FlatTreeEntry],
        options: &CloneOptions,
    ) -> anyhow::Result<()> {
        stream::iter(files.chunks(options.batch_size).map(|chunk| async move {
            let mut seen = HashSet::new();
            let hashes = chunk
                .iter()
                .map(|entry| entry.hash)
                .filter(|hash| seen.insert(*hash))
                .collect::<Vec<ObjectId>>();

            let blobs = self.load_blobs(store, hashes).await?;

            for entry in chunk {
                let blob = match blobs.get(&entry.hash) {
                    Some(blob) => blob.clone(),
                    None => {
                        debug!(path = %entry.path, hash = %entry.hash, "blob missing from batch, fetching it alone");
                        self.load_blob(store, entry.hash)
                            .await
                            .with_context(|| format!("fetch {:?}", entry.path))?
                    }
                };
                workspace.write_file(&entry.path, &blob.content, entry.mode).await?;
            }

            anyhow::Ok(())
        }))
        .buffer_unordered(options.in_flight())
        .try_collect::<Vec<()>>()
        .await?;

        Ok(())
    }
}

/// Selected files plus the directories that contain them, in listing order
fn select_entries(tree: &FlatTree, filter: &PathFilter) -> Vec<FlatTreeEntry> {
    let files = tree
        .files()
        .filter(|entry| filter.matches(&entry.path))
        .map(|entry| entry.path.as_str())
        .collect::<HashSet<_>>();

    let mut directories = HashSet::new();
    for path in &files {
        let mut rest = *path;
        while let Some((parent, _)) = rest.rsplit_once('/') {
            if !directories.insert(parent) {
                break;
            }
            rest = parent;
        }
    }

    tree.entries
        .iter()
        .filter(|entry| {
            let path = entry.path.as_str();
            if entry.is_tree() { directories.contains(path) } else { files.contains(path) }
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::MODE_REGULAR;
    use pretty_assertions::assert_eq;

    fn oid(seed: &str) -> ObjectId {
        ObjectId::hash_object("blob", seed.as_bytes())
    }

    #[test]
    fn selection_keeps_ancestor_directories_of_selected_files() {
        let tree = FlatTree {
            hash: ObjectId::ZERO,
            entries: vec![
                FlatTreeEntry::directory("docs", oid("docs")),
                FlatTreeEntry::new("docs/b.md", MODE_REGULAR, oid("b")),
                FlatTreeEntry::directory("src", oid("src")),
                FlatTreeEntry::directory("src/deep", oid("deep")),
                FlatTreeEntry::new("src/deep/a.go", MODE_REGULAR, oid("a")),
            ],
        };
        let filter = PathFilter::new(&["src/**"], &[]).unwrap();

        let selected = select_entries(&tree, &filter);

        let paths = selected.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["src", "src/deep", "src/deep/a.go"]);
    }
}
