//! Commit history options
//!
//! - `options`: pagination and filters for a history walk
//!
//! ## Algorithm
//!
//! The walk itself lives with the reader, since every step may need a
//! fetch. It follows first parents breadth-first from the start commit,
//! keeps commits that pass every active filter, and stops once enough
//! matches have been collected to fill the requested page.

pub mod options;
