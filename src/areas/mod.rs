//! Operations against a remote repository
//!
//! - `client`: transport handle, options and the per-operation object store
//! - `database`: object store contract and its in-memory implementation
//! - `reader`: blob, tree, commit and history reads
//! - `clone`: filtered snapshots written to a local directory
//! - `refs`: listing and mutating refs
//! - `staged_writer`: staged changes, commits and pushes on one ref
//! - `workspace`: the local directory a clone writes into

pub mod client;
pub(crate) mod clone;
pub mod database;
pub(crate) mod reader;
pub(crate) mod refs;
pub mod staged_writer;
pub(crate) mod workspace;
