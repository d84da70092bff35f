use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::protocol::transport::FetchOptions;
use crate::error::GitError;
use anyhow::Context;

impl Client {
    pub async fn get_commit(&self, hash: ObjectId) -> anyhow::Result<Commit> {
        let store = self.store();

        self.load_commit(&*store, hash)
            .await
            .with_context(|| format!("get commit {hash}"))
    }

    /// Shallow fetch of one commit, keeping nothing else from the response
    pub(crate) async fn load_commit(&self, store: &dyn ObjectStore, hash: ObjectId) -> anyhow::Result<Commit> {
        if let Some(object) = store.get_by_type(&hash, ObjectType::Commit)
            && let Some(commit) = &object.commit
        {
            return Ok(Commit::from_packfile(hash, commit));
        }

        let mut response = self.fetch(FetchOptions::want(vec![hash]).deepen(1)).await?;
        let object = response
            .remove(&hash)
            .ok_or(GitError::ObjectNotFound { id: hash })?;

        let Some(commit) = &object.commit else {
            return Err(GitError::UnexpectedObjectType {
                id: hash,
                expected: ObjectType::Commit,
                actual: object.object_type,
            }
            .into());
        };

        let commit = Commit::from_packfile(hash, commit);
        store.add(object);
        Ok(commit)
    }

    /// Fetch a commit along with up to `depth` ancestors, caching them all
    pub(crate) async fn load_commit_with_history(
        &self,
        store: &dyn ObjectStore,
        hash: ObjectId,
        depth: usize,
    ) -> anyhow::Result<Commit> {
        let object = self
            .load_object(
                store,
                hash,
                ObjectType::Commit,
                FetchOptions::want(vec![hash]).deepen(depth),
            )
            .await?;

        let commit = object.commit.as_ref().ok_or(GitError::UnexpectedObjectType {
            id: hash,
            expected: ObjectType::Commit,
            actual: object.object_type,
        })?;
        Ok(Commit::from_packfile(hash, commit))
    }
}
