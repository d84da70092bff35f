use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::areas::reader::path_components;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use crate::artifacts::protocol::transport::FetchOptions;
use crate::error::GitError;
use anyhow::Context;

impl Client {
    /// Direct children of one tree
    pub async fn get_tree(&self, hash: ObjectId) -> anyhow::Result<Tree> {
        let store = self.store();

        self.load_tree(&*store, hash)
            .await
            .with_context(|| format!("get tree {hash}"))
    }

    /// Tree at `path` below `root`, a tree or commit hash
    ///
    /// An empty path or `.` resolves to the root tree itself.
    pub async fn get_tree_by_path(&self, root: ObjectId, path: &str) -> anyhow::Result<Tree> {
        let store = self.store();

        self.tree_at_path(&*store, root, path)
            .await
            .with_context(|| format!("get tree by path {path:?}"))
    }

    pub(crate) async fn load_tree(&self, store: &dyn ObjectStore, hash: ObjectId) -> anyhow::Result<Tree> {
        let object = self
            .load_object(store, hash, ObjectType::Tree, FetchOptions::want(vec![hash]))
            .await?;

        Ok(Tree {
            hash,
            entries: object.tree.iter().map(TreeEntry::from).collect(),
        })
    }

    pub(crate) async fn tree_at_path(
        &self,
        store: &dyn ObjectStore,
        root: ObjectId,
        path: &str,
    ) -> anyhow::Result<Tree> {
        let root_tree = self.root_tree_of(store, root).await?;
        if path.is_empty() || path == "." {
            return self.load_tree(store, root_tree).await;
        }

        match self.resolve_entry(store, root_tree, path).await? {
            Some(entry) if entry.object_type == ObjectType::Tree => self.load_tree(store, entry.hash).await,
            Some(entry) => Err(GitError::UnexpectedObjectType {
                id: entry.hash,
                expected: ObjectType::Tree,
                actual: entry.object_type,
            }
            .into()),
            None => Err(GitError::PathNotFound {
                path: path.to_string(),
            }
            .into()),
        }
    }

    /// Walk `path` one level at a time from `root_tree`
    ///
    /// Returns `None` when a component is missing or a non-directory sits
    /// where a directory is needed.
    pub(crate) async fn resolve_entry(
        &self,
        store: &dyn ObjectStore,
        root_tree: ObjectId,
        path: &str,
    ) -> anyhow::Result<Option<TreeEntry>> {
        let components = path_components(path, true)?;
        let Some((last, parents)) = components.split_last() else {
            return Ok(None);
        };

        let mut current = root_tree;
        for component in parents {
            let tree = self.load_tree(store, current).await?;
            match tree.entry(component) {
                Some(entry) if entry.object_type == ObjectType::Tree => current = entry.hash,
                _ => return Ok(None),
            }
        }

        let tree = self.load_tree(store, current).await?;
        Ok(tree.entry(last).cloned())
    }
}
