//! Error kinds surfaced by every operation
//!
//! All fallible functions return `anyhow::Result`. When a failure has a
//! stable meaning it is raised as a [`GitError`] and then wrapped with
//! context as it crosses component boundaries ("fetch blob <hash>", ...).
//! Callers recover the kind with [`error_kind`], which sees through any
//! number of context layers, and should match on it rather than on the
//! message text.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitError {
    #[error("object {id} not found")]
    ObjectNotFound { id: ObjectId },

    #[error("path {path:?} not found")]
    PathNotFound { path: String },

    #[error("ref {name:?} not found")]
    RefNotFound { name: String },

    #[error("object {id} already exists")]
    ObjectAlreadyExists { id: ObjectId },

    #[error("ref {name:?} already exists")]
    RefAlreadyExists { name: String },

    #[error("object {id} has unexpected type: expected {expected}, got {actual}")]
    UnexpectedObjectType {
        id: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("unexpected object count: expected {expected}, got {actual}")]
    UnexpectedObjectCount {
        expected: usize,
        actual: usize,
        objects: Vec<ObjectId>,
    },

    #[error("invalid {field}: {reason}")]
    InvalidAuthor { field: String, reason: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid ref name {name:?}")]
    InvalidRefName { name: String },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("nothing to push")]
    NothingToPush,

    #[error("commit message cannot be empty")]
    EmptyCommitMessage,

    #[error("path cannot be empty")]
    EmptyPath,

    #[error("ref name cannot be empty")]
    EmptyRefName,

    #[error("exceeded maximum batch limit of {limit} batches")]
    BatchLimitExceeded { limit: usize },

    #[error("writer has been cleaned up and can no longer be used")]
    WriterCleanedUp,

    #[error("server unavailable (status {status}): {message}")]
    ServerUnavailable { status: u16, message: String },
}

impl GitError {
    /// Object, path and ref misses share one coarse "not found" kind
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GitError::ObjectNotFound { .. }
                | GitError::PathNotFound { .. }
                | GitError::RefNotFound { .. }
        )
    }

    /// Object and ref collisions share one coarse "already exists" kind
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            GitError::ObjectAlreadyExists { .. } | GitError::RefAlreadyExists { .. }
        )
    }

    /// Failures a caller may reasonably retry
    pub fn is_transient(&self) -> bool {
        matches!(self, GitError::ServerUnavailable { .. })
    }
}

/// Recover the [`GitError`] kind behind an error, if it has one
pub fn error_kind(error: &anyhow::Error) -> Option<&GitError> {
    error.downcast_ref::<GitError>()
}

/// Shorthand for "is this a not-found failure of any flavor"
pub fn is_not_found(error: &anyhow::Error) -> bool {
    error_kind(error).is_some_and(GitError::is_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_nested_context() {
        let err = Err::<(), _>(GitError::PathNotFound {
            path: "a/b".to_string(),
        })
        .context("walk tree")
        .context("get blob by path \"a/b\"")
        .unwrap_err();

        assert!(is_not_found(&err));
        assert!(matches!(error_kind(&err), Some(GitError::PathNotFound { .. })));
        assert!(format!("{err:#}").contains("get blob by path"));
    }

    #[test]
    fn coarse_kinds_group_related_errors() {
        assert!(GitError::RefNotFound { name: "x".into() }.is_not_found());
        assert!(GitError::RefAlreadyExists { name: "x".into() }.is_already_exists());
        assert!(!GitError::NothingToPush.is_not_found());
        assert!(
            GitError::ServerUnavailable {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn errors_without_a_kind_report_none() {
        let err = anyhow::anyhow!("plain failure");

        assert!(error_kind(&err).is_none());
        assert!(!is_not_found(&err));
    }
}
