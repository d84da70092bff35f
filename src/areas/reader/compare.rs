use crate::areas::client::Client;
use crate::artifacts::diff::tree_diff::{CommitFile, compare_flat_trees};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use tracing::debug;

impl Client {
    /// Files added, modified or deleted going from `base` to `head`
    ///
    /// Both trees are listed concurrently over one shared store; the first
    /// failure cancels the other listing.
    pub async fn compare_commits(&self, base: ObjectId, head: ObjectId) -> anyhow::Result<Vec<CommitFile>> {
        let store = self.store();

        let (base_tree, head_tree) = tokio::try_join!(
            async {
                self.load_flat_tree(&*store, base)
                    .await
                    .with_context(|| format!("list base tree {base}"))
            },
            async {
                self.load_flat_tree(&*store, head)
                    .await
                    .with_context(|| format!("list head tree {head}"))
            },
        )
        .with_context(|| format!("compare {base}..{head}"))?;

        let changes = compare_flat_trees(&base_tree, &head_tree);
        debug!(base = %base, head = %head, changes = changes.len(), "commits compared");

        Ok(changes)
    }
}
