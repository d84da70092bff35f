//! Content-addressed objects and their views
//!
//! Every object is named by the SHA-1 of its type header and payload:
//!
//! - **Blob**: file content
//! - **Tree**: one directory level (mode, name, id per entry)
//! - **Commit**: root tree, parents, identities and message
//! - **Tag**: carried through packfiles but never interpreted
//!
//! Objects travel as [`object::PackfileObject`] values; readers hand out the
//! lighter [`blob::Blob`], [`tree::Tree`], [`tree::FlatTree`] and
//! [`commit::Commit`] views.

pub mod blob;
pub mod commit;
pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod reference;
pub mod tree;

/// Hex digits in a textual object id
pub const OBJECT_ID_LENGTH: usize = 40;

/// Bytes in a binary object id
pub const OBJECT_ID_BYTES: usize = 20;
