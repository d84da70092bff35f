//! Read operations against the remote object graph
//!
//! - `blobs`: single blobs, by hash or by path
//! - `trees`: single tree levels and path resolution
//! - `flat_tree`: recursive listings with batched, retried tree fetches
//! - `commits`: single commits
//! - `history`: paginated, filtered history walks
//! - `compare`: file-level comparison of two commits
//!
//! Every operation checks the object store before going to the network and
//! caches what the remote sends back, extra objects included.

mod blobs;
mod commits;
mod compare;
mod flat_tree;
mod history;
mod trees;

use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::protocol::transport::FetchOptions;
use crate::error::GitError;
use std::sync::Arc;

impl Client {
    /// Return `id` from the store, fetching it with `options` on a miss
    ///
    /// Everything in the response is cached. Fails with `ObjectNotFound`
    /// if the remote does not send `id` and `UnexpectedObjectType` if it is
    /// not of the expected type.
    pub(crate) async fn load_object(
        &self,
        store: &dyn ObjectStore,
        id: ObjectId,
        expected: ObjectType,
        options: FetchOptions,
    ) -> anyhow::Result<Arc<PackfileObject>> {
        if let Some(object) = store.get(&id) {
            return check_type(object, expected);
        }

        let response = self.fetch(options).await?;
        store.add_all(response.into_values().collect());

        match store.get(&id) {
            Some(object) => check_type(object, expected),
            None => Err(GitError::ObjectNotFound { id }.into()),
        }
    }

    /// Resolve a commit or tree hash to the hash of its root tree
    pub(crate) async fn root_tree_of(
        &self,
        store: &dyn ObjectStore,
        id: ObjectId,
    ) -> anyhow::Result<ObjectId> {
        let object = match store.get(&id) {
            Some(object) => object,
            None => {
                let response = self.fetch(FetchOptions::want(vec![id]).deepen(1)).await?;
                store.add_all(response.into_values().collect());
                store.get(&id).ok_or(GitError::ObjectNotFound { id })?
            }
        };

        match (&object.commit, object.object_type) {
            (Some(commit), ObjectType::Commit) => Ok(commit.tree),
            (_, ObjectType::Tree) => Ok(id),
            (_, actual) => Err(GitError::UnexpectedObjectType {
                id,
                expected: ObjectType::Tree,
                actual,
            }
            .into()),
        }
    }
}

fn check_type(
    object: Arc<PackfileObject>,
    expected: ObjectType,
) -> anyhow::Result<Arc<PackfileObject>> {
    if object.is_type(expected) {
        Ok(object)
    } else {
        Err(GitError::UnexpectedObjectType {
            id: object.hash,
            expected,
            actual: object.object_type,
        }
        .into())
    }
}

/// Split a `/`-separated path into its components
///
/// Empty paths are rejected, as are paths with a trailing `/` when
/// `allow_trailing_slash` is off. Empty components (`a//b`) are skipped.
pub(crate) fn path_components(path: &str, allow_trailing_slash: bool) -> anyhow::Result<Vec<&str>> {
    if path.is_empty() {
        return Err(GitError::EmptyPath.into());
    }
    if !allow_trailing_slash && path.ends_with('/') {
        return Err(GitError::InvalidPath {
            path: path.to_string(),
            reason: "trailing slash".to_string(),
        }
        .into());
    }

    Ok(path
        .split('/')
        .filter(|component| !component.is_empty() && *component != ".")
        .collect())
}
