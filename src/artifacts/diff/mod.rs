//! Tree comparison
//!
//! - `tree_diff`: file-level changes between two flattened trees
//!
//! Only which paths changed is computed; content-level diffs are left to
//! callers, who can fetch both blobs by hash.

pub mod tree_diff;
