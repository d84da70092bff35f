//! Read and write a remote Git repository's object graph over the smart
//! HTTP protocol (v2), without a local working copy.
//!
//! - [`Client`] reads blobs, trees, recursive listings, commits and
//!   history, compares commits, manages refs and clones filtered
//!   snapshots into a local directory.
//! - [`StagedWriter`] stages blob and tree changes on one ref, turns them
//!   into commits and pushes everything in a single `receive-pack`
//!   exchange.
//! - [`Transport`] is the seam to the network. [`MemoryRemote`] implements
//!   it in memory and is what the tests run against.
//!
//! Every operation returns `anyhow::Result`; use [`error_kind`] to recover
//! the [`GitError`] kind of a failure.

pub mod areas;
pub mod artifacts;
pub mod error;

pub use areas::client::{Client, ClientOptions};
pub use areas::database::{MemoryStore, ObjectStore};
pub use areas::staged_writer::{StagedWriter, WriterOptions};
pub use artifacts::clone::options::{CloneOptions, CloneResult};
pub use artifacts::diff::tree_diff::{CommitFile, FileStatus};
pub use artifacts::log::options::ListCommitsOptions;
pub use artifacts::objects;
pub use artifacts::protocol::memory::MemoryRemote;
pub use artifacts::protocol::packfile::StorageMode;
pub use artifacts::protocol::transport::{FetchOptions, Transport, TransportError};
pub use error::{GitError, error_kind, is_not_found};
