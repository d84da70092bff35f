use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::areas::reader::path_components;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::protocol::transport::FetchOptions;
use crate::error::GitError;
use anyhow::Context;
use std::collections::HashMap;
use tracing::debug;

impl Client {
    /// Fetch exactly one blob
    pub async fn get_blob(&self, hash: ObjectId) -> anyhow::Result<Blob> {
        let store = self.store();

        self.load_blob(&*store, hash)
            .await
            .with_context(|| format!("fetch blob {hash}"))
    }

    /// Fetch the blob at `path` below `root`, a tree or commit hash
    pub async fn get_blob_by_path(&self, root: ObjectId, path: &str) -> anyhow::Result<Blob> {
        let store = self.store();

        self.blob_at_path(&*store, root, path)
            .await
            .with_context(|| format!("get blob by path {path:?}"))
    }

    pub(crate) async fn blob_at_path(
        &self,
        store: &dyn ObjectStore,
        root: ObjectId,
        path: &str,
    ) -> anyhow::Result<Blob> {
        path_components(path, false)?;
        let root_tree = self.root_tree_of(store, root).await?;

        match self.resolve_entry(store, root_tree, path).await? {
            Some(entry) if entry.object_type == ObjectType::Blob => self.load_blob(store, entry.hash).await,
            Some(entry) => Err(GitError::UnexpectedObjectType {
                id: entry.hash,
                expected: ObjectType::Blob,
                actual: entry.object_type,
            }
            .into()),
            None => Err(GitError::PathNotFound {
                path: path.to_string(),
            }
            .into()),
        }
    }

    /// Fetch one blob with no extra objects
    pub(crate) async fn load_blob(&self, store: &dyn ObjectStore, hash: ObjectId) -> anyhow::Result<Blob> {
        if let Some(object) = store.get_by_type(&hash, ObjectType::Blob) {
            return Ok(Blob::new(hash, object.data.clone()));
        }

        let mut response = self
            .fetch(FetchOptions::want(vec![hash]).with_blobs().only_wanted())
            .await?;

        if response.len() > 1 {
            return Err(GitError::UnexpectedObjectCount {
                expected: 1,
                actual: response.len(),
                objects: response.keys().copied().collect(),
            }
            .into());
        }

        let object = response
            .remove(&hash)
            .ok_or(GitError::ObjectNotFound { id: hash })?;
        if !object.is_type(ObjectType::Blob) {
            return Err(GitError::UnexpectedObjectType {
                id: hash,
                expected: ObjectType::Blob,
                actual: object.object_type,
            }
            .into());
        }

        let blob = Blob::new(hash, object.data.clone());
        store.add(object);
        Ok(blob)
    }

    /// Fetch several blobs in one exchange
    ///
    /// Blobs the remote leaves out are simply absent from the result.
    pub(crate) async fn load_blobs(
        &self,
        store: &dyn ObjectStore,
        hashes: Vec<ObjectId>,
    ) -> anyhow::Result<HashMap<ObjectId, Blob>> {
        let mut blobs = HashMap::new();
        let mut missing = Vec::new();
        for hash in hashes {
            match store.get_by_type(&hash, ObjectType::Blob) {
                Some(object) => {
                    blobs.insert(hash, Blob::new(hash, object.data.clone()));
                }
                None => missing.push(hash),
            }
        }
        if missing.is_empty() {
            return Ok(blobs);
        }

        let requested = missing.len();
        let response = self
            .fetch(FetchOptions::want(missing).with_blobs().only_wanted())
            .await?;
        debug!(requested, received = response.len(), "blob batch fetched");

        for (hash, object) in response {
            if object.is_type(ObjectType::Blob) {
                blobs.insert(hash, Blob::new(hash, object.data.clone()));
                store.add(object);
            }
        }

        Ok(blobs)
    }
}
