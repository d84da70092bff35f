//! Git blob object
//!
//! Blobs store file content in Git. They contain only the raw file data,
//! without any metadata like filename or permissions (those are stored in trees).

use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use derive_new::new;

/// File content fetched from the remote, immutable once read
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    pub hash: ObjectId,
    pub content: Bytes,
}

impl Blob {
    /// Content as UTF-8, if it is valid text
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}
