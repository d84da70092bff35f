use crate::areas::client::Client;
use crate::areas::database::ObjectStore;
use crate::artifacts::log::options::ListCommitsOptions;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

impl Client {
    /// Walk history from `start`, newest first, one page at a time
    ///
    /// Only first parents are followed. Commits are fetched `per_page` at a
    /// time, so a page usually costs one exchange.
    pub async fn list_commits(
        &self,
        start: ObjectId,
        options: &ListCommitsOptions,
    ) -> anyhow::Result<Vec<Commit>> {
        let store = self.store();

        self.walk_history(&*store, start, options)
            .await
            .with_context(|| format!("list commits from {start}"))
    }

    async fn walk_history(
        &self,
        store: &dyn ObjectStore,
        start: ObjectId,
        options: &ListCommitsOptions,
    ) -> anyhow::Result<Vec<Commit>> {
        let depth = options.effective_per_page();
        let skip = options.skip();
        let limit = options.limit();

        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);
        let mut matched = 0;
        let mut page = Vec::new();

        while let Some(hash) = queue.pop_front() {
            let commit = self.load_commit_with_history(store, hash, depth).await?;

            if self.commit_matches(store, &commit, options).await? {
                matched += 1;
                if matched > skip {
                    page.push(commit.clone());
                }
                if matched >= limit {
                    break;
                }
            }

            if commit.has_parent() && visited.insert(commit.parent) {
                queue.push_back(commit.parent);
            }
        }

        debug!(
            start = %start,
            matched,
            returned = page.len(),
            "history walk complete"
        );
        Ok(page)
    }

    async fn commit_matches(
        &self,
        store: &dyn ObjectStore,
        commit: &Commit,
        options: &ListCommitsOptions,
    ) -> anyhow::Result<bool> {
        if !options.in_time_window(commit.time()) {
            return Ok(false);
        }

        match &options.path {
            Some(path) => self
                .commit_affects_path(store, commit, path)
                .await
                .with_context(|| format!("check whether {} changed {path:?}", commit.hash)),
            None => Ok(true),
        }
    }

    /// Whether `commit` changed `path` relative to its first parent
    ///
    /// A root commit affects every path it contains.
    pub(crate) async fn commit_affects_path(
        &self,
        store: &dyn ObjectStore,
        commit: &Commit,
        path: &str,
    ) -> anyhow::Result<bool> {
        let current = self.resolve_entry(store, commit.tree, path).await?;
        if !commit.has_parent() {
            return Ok(current.is_some());
        }

        let parent = self.load_commit(store, commit.parent).await?;
        let previous = self.resolve_entry(store, parent.tree, path).await?;

        Ok(match (current, previous) {
            (Some(current), Some(previous)) => current.hash != previous.hash,
            (None, None) => false,
            _ => true,
        })
    }
}
