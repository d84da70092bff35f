//! Recursive tree listings
//!
//! ## Algorithm
//!
//! 1. Fetch the target (commit or tree) shallowly and find its root tree.
//!    Whatever trees the remote volunteers in that response are cached.
//! 2. Walk the cached part of the tree. Every directory whose tree is not
//!    cached yet is queued once; queued trees are fetched in batches.
//! 3. Trees a batch did not deliver go to a retry queue and are fetched
//!    again in smaller batches. A tree that is still missing after the last
//!    attempt fails the walk.
//! 4. Each delivered tree is scanned for unvisited directories, which feeds
//!    step 2 until nothing is queued.
//! 5. With every tree cached, the listing is produced depth first with
//!    children sorted by name.
//!
//! A hard ceiling on the number of batches stops a remote that keeps
//! answering without making progress.

use crate::areas::client::{Client, ClientOptions};
use crate::areas::database::ObjectStore;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{FlatTree, FlatTreeEntry, PackfileTreeEntry};
use crate::artifacts::protocol::transport::FetchOptions;
use crate::error::{GitError, error_kind};
use anyhow::Context;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// What the walk should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchStep {
    Fetch(Vec<ObjectId>),
    Done,
}

/// Result of accounting for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    Progress,
    Exhausted { id: ObjectId, attempts: usize },
}

/// Bookkeeping for the batched tree walk
#[derive(Debug)]
pub(crate) struct TreeFetchState {
    options: ClientOptions,
    pending: VecDeque<ObjectId>,
    retry: VecDeque<ObjectId>,
    requested: HashSet<ObjectId>,
    processed: HashSet<ObjectId>,
    attempts: HashMap<ObjectId, usize>,
    batches: usize,
}

impl TreeFetchState {
    pub(crate) fn new(options: ClientOptions) -> Self {
        TreeFetchState {
            options,
            pending: VecDeque::new(),
            retry: VecDeque::new(),
            requested: HashSet::new(),
            processed: HashSet::new(),
            attempts: HashMap::new(),
            batches: 0,
        }
    }

    pub(crate) fn batches(&self) -> usize {
        self.batches
    }

    /// Scan `root` and every cached tree below it, queueing uncached ones
    pub(crate) fn visit(&mut self, store: &dyn ObjectStore, root: ObjectId) {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if self.processed.contains(&id) {
                continue;
            }

            match store.get_by_type(&id, ObjectType::Tree) {
                Some(tree) => {
                    self.processed.insert(id);
                    stack.extend(
                        tree.tree
                            .iter()
                            .filter(|entry| entry.is_directory())
                            .map(|entry| entry.hash),
                    );
                }
                None => {
                    if self.requested.insert(id) {
                        self.pending.push_back(id);
                    }
                }
            }
        }
    }

    /// Pick the next batch, retries first
    ///
    /// Queued trees that arrived as extras of an earlier batch are scanned
    /// instead of fetched.
    pub(crate) fn next_step(&mut self, store: &dyn ObjectStore) -> anyhow::Result<FetchStep> {
        loop {
            let (queue_is_retry, limit) = if !self.retry.is_empty() {
                (true, self.options.tree_retry_batch_size.max(1))
            } else if !self.pending.is_empty() {
                (false, self.options.tree_batch_size.max(1))
            } else {
                return Ok(FetchStep::Done);
            };

            let mut batch = Vec::with_capacity(limit);
            while batch.len() < limit {
                let next = if queue_is_retry {
                    self.retry.pop_front()
                } else {
                    self.pending.pop_front()
                };
                let Some(id) = next else { break };

                if store.contains(&id) {
                    self.visit(store, id);
                } else {
                    batch.push(id);
                }
            }

            if batch.is_empty() {
                continue;
            }

            self.batches += 1;
            if self.batches > self.options.max_tree_batches {
                return Err(GitError::BatchLimitExceeded {
                    limit: self.options.max_tree_batches,
                }
                .into());
            }

            return Ok(FetchStep::Fetch(batch));
        }
    }

    /// Account for a finished batch
    ///
    /// Delivered trees are scanned; missing ones count an attempt and are
    /// queued for retry until they run out of attempts.
    pub(crate) fn record(&mut self, store: &dyn ObjectStore, batch: &[ObjectId]) -> BatchOutcome {
        let mut outcome = BatchOutcome::Progress;

        for id in batch {
            if store.get_by_type(id, ObjectType::Tree).is_some() {
                self.visit(store, *id);
                continue;
            }

            let attempts = self.attempts.entry(*id).or_default();
            *attempts += 1;
            if *attempts >= self.options.max_tree_retries.max(1) {
                if outcome == BatchOutcome::Progress {
                    outcome = BatchOutcome::Exhausted {
                        id: *id,
                        attempts: *attempts,
                    };
                }
            } else {
                trace!(hash = %id, attempt = *attempts, "tree missing from batch, will retry");
                self.retry.push_back(*id);
            }
        }

        outcome
    }
}

impl Client {
    /// Full recursive listing of a commit's or tree's root tree
    pub async fn get_flat_tree(&self, hash: ObjectId) -> anyhow::Result<FlatTree> {
        let store = self.store();

        self.load_flat_tree(&*store, hash)
            .await
            .with_context(|| format!("get flat tree {hash}"))
    }

    pub(crate) async fn load_flat_tree(
        &self,
        store: &dyn ObjectStore,
        hash: ObjectId,
    ) -> anyhow::Result<FlatTree> {
        let root = self.root_tree_of(store, hash).await?;
        self.fetch_all_trees(store, root).await?;

        self.flatten(store, root).await
    }

    /// Make sure every tree below `root` is cached
    async fn fetch_all_trees(&self, store: &dyn ObjectStore, root: ObjectId) -> anyhow::Result<()> {
        let mut state = TreeFetchState::new(*self.options());
        state.visit(store, root);

        loop {
            let batch = match state.next_step(store)? {
                FetchStep::Done => break,
                FetchStep::Fetch(batch) => batch,
            };
            trace!(trees = batch.len(), batch = state.batches(), "fetching tree batch");

            match self.fetch(FetchOptions::want(batch.clone())).await {
                Ok(response) => store.add_all(response.into_values().collect()),
                // the remote refused part of the batch; count it against every tree in it
                Err(err) if matches!(error_kind(&err), Some(GitError::ObjectNotFound { .. })) => {
                    warn!(trees = batch.len(), "tree batch refused: {err:#}");
                }
                Err(err) => return Err(err),
            }

            if let BatchOutcome::Exhausted { id, attempts } = state.record(store, &batch) {
                return Err(anyhow::Error::new(GitError::ObjectNotFound { id })
                    .context(format!("tree {id} still missing after {attempts} attempts")));
            }
        }

        debug!(root = %root, batches = state.batches(), "tree walk complete");
        Ok(())
    }

    /// Depth-first listing with children sorted by name
    ///
    /// A tree missing from the store is fetched on its own before the
    /// listing gives up on it.
    async fn flatten(&self, store: &dyn ObjectStore, root: ObjectId) -> anyhow::Result<FlatTree> {
        let mut entries = Vec::new();
        let mut stack = Vec::new();
        self.push_children(store, root, "", &mut stack).await?;

        while let Some((path, entry)) = stack.pop() {
            let is_directory = entry.is_directory();
            entries.push(FlatTreeEntry::new(path.clone(), entry.mode, entry.hash));

            if is_directory {
                self.push_children(store, entry.hash, &path, &mut stack).await?;
            }
        }

        Ok(FlatTree {
            hash: root,
            entries,
        })
    }

    async fn push_children(
        &self,
        store: &dyn ObjectStore,
        tree: ObjectId,
        prefix: &str,
        stack: &mut Vec<(String, PackfileTreeEntry)>,
    ) -> anyhow::Result<()> {
        let object = match store.get_by_type(&tree, ObjectType::Tree) {
            Some(object) => object,
            None => self
                .load_object(store, tree, ObjectType::Tree, FetchOptions::want(vec![tree]))
                .await
                .with_context(|| format!("fetch tree {tree} individually"))?,
        };

        let mut children = object.tree.clone();
        // reversed so the smallest name is popped first
        children.sort_by(|a, b| b.name.cmp(&a.name));

        for child in children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{prefix}/{}", child.name)
            };
            stack.push((path, child));
        }

        Ok(())
    }
}
