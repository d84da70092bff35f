//! Named pointers into the object graph
//!
//! Ref names are opaque to the reader (`refs/heads/main`, `refs/tags/v1`),
//! but names sent in a ref update must satisfy Git's ref-name rules.

use crate::artifacts::objects::object_id::ObjectId;
use crate::error::GitError;
use derive_new::new;

/// Characters and sequences Git refuses in ref names
pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";

#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct Ref {
    pub name: String,
    pub hash: ObjectId,
}

/// Validate a full ref name before it is sent in a ref update
pub fn validate_ref_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        return Err(GitError::EmptyRefName.into());
    }

    let re = regex::Regex::new(INVALID_REF_NAME_REGEX)?;
    if re.is_match(name) {
        return Err(GitError::InvalidRefName {
            name: name.to_string(),
        }
        .into());
    }

    Ok(())
}
