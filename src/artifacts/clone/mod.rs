//! Partial clone building blocks
//!
//! - `options`: clone options and result
//! - `path_filter`: include/exclude pattern matching

pub mod options;
pub mod path_filter;
