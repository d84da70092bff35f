//! Git data structures and wire formats
//!
//! - `clone`: clone options, results and path filters
//! - `diff`: file-level comparison of two flat trees
//! - `log`: history listing options
//! - `objects`: object ids, blobs, trees, commits and refs
//! - `protocol`: pkt-lines, packfiles and the transport contract

pub mod clone;
pub mod diff;
pub mod log;
pub mod objects;
pub mod protocol;
