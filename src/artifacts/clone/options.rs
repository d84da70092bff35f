use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::FlatTree;
use std::path::PathBuf;

/// What to clone and how to download it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// Destination directory, created if missing
    pub path: PathBuf,
    /// Commit to materialize
    pub hash: ObjectId,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    /// Blobs per fetch; 0 or 1 fetches each blob on its own
    pub batch_size: usize,
    /// Fetches in flight; 0 or 1 runs them one after another
    pub concurrency: usize,
}

impl CloneOptions {
    pub fn new(path: impl Into<PathBuf>, hash: ObjectId) -> Self {
        CloneOptions {
            path: path.into(),
            hash,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            batch_size: 0,
            concurrency: 0,
        }
    }

    pub fn include(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_paths.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_paths.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn is_batched(&self) -> bool {
        self.batch_size > 1
    }

    /// Fetches allowed in flight at once, never less than one
    pub fn in_flight(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Outcome of a clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneResult {
    pub path: PathBuf,
    pub commit: Commit,
    /// The entries that were written, directories included
    pub flat_tree: FlatTree,
    /// Files in the commit before filtering
    pub total_files: usize,
    /// Files written after filtering
    pub filtered_files: usize,
}
