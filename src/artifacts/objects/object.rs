use crate::artifacts::objects::commit::{Author, Committer, PackfileCommit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{PackfileTreeEntry, deserialize_tree, serialize_tree};
use anyhow::Context;
use bytes::Bytes;

/// A Git object as exchanged with the remote
///
/// The raw payload is always kept in `data`; trees and commits are also
/// decoded so callers never re-parse them. The hash is computed from the
/// payload, so objects built locally and objects received from a remote
/// are indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileObject {
    pub hash: ObjectId,
    pub object_type: ObjectType,
    pub data: Bytes,
    /// Decoded entries, empty unless this is a tree
    pub tree: Vec<PackfileTreeEntry>,
    /// Decoded header and message, present only for commits
    pub commit: Option<PackfileCommit>,
}

impl PackfileObject {
    /// Build an object from its type and raw payload
    pub fn from_raw(object_type: ObjectType, data: Bytes) -> anyhow::Result<Self> {
        let hash = ObjectId::hash_object(object_type.as_str(), &data);

        let tree = match object_type {
            ObjectType::Tree => {
                deserialize_tree(&data).with_context(|| format!("parse tree {hash}"))?
            }
            _ => Vec::new(),
        };
        let commit = match object_type {
            ObjectType::Commit => Some(
                PackfileCommit::deserialize(&data).with_context(|| format!("parse commit {hash}"))?,
            ),
            _ => None,
        };

        Ok(PackfileObject {
            hash,
            object_type,
            data,
            tree,
            commit,
        })
    }

    pub fn blob(content: impl Into<Bytes>) -> Self {
        let data = content.into();

        PackfileObject {
            hash: ObjectId::hash_object(ObjectType::Blob.as_str(), &data),
            object_type: ObjectType::Blob,
            data,
            tree: Vec::new(),
            commit: None,
        }
    }

    /// Build a tree object; entries are stored in canonical order
    pub fn tree(entries: &[PackfileTreeEntry]) -> anyhow::Result<Self> {
        let data = serialize_tree(entries)?;
        let hash = ObjectId::hash_object(ObjectType::Tree.as_str(), &data);
        // keep the decoded view in stored order
        let tree = deserialize_tree(&data)?;

        Ok(PackfileObject {
            hash,
            object_type: ObjectType::Tree,
            data,
            tree,
            commit: None,
        })
    }

    pub fn commit(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Author,
        committer: Committer,
        message: impl Into<String>,
    ) -> Self {
        let commit = PackfileCommit {
            tree,
            parents,
            author,
            committer,
            message: message.into(),
        };
        let data = commit.serialize();

        PackfileObject {
            hash: ObjectId::hash_object(ObjectType::Commit.as_str(), &data),
            object_type: ObjectType::Commit,
            data,
            tree: Vec::new(),
            commit: Some(commit),
        }
    }

    pub fn is_type(&self, object_type: ObjectType) -> bool {
        self.object_type == object_type
    }
}
