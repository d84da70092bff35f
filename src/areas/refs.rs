//! Ref management
//!
//! Refs are read with `ls-refs` and changed with `receive-pack` command
//! lists (`<old> <new> <name>`). The old value sent with each command is
//! the one just read, so a concurrent change on the remote makes the update
//! fail instead of being overwritten. Creates and updates carry an empty
//! packfile; deletes carry none.

use crate::areas::client::Client;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::reference::{Ref, validate_ref_name};
use crate::artifacts::protocol::packfile::{PackfileWriter, RefUpdate, StorageMode};
use crate::error::GitError;
use anyhow::Context;
use std::io::Cursor;
use tracing::debug;

impl Client {
    /// Refs whose names start with `prefix`, or every ref
    pub async fn list_refs(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ref>> {
        self.ls_refs(prefix).await.context("list refs")
    }

    pub async fn get_ref(&self, name: &str) -> anyhow::Result<Ref> {
        if name.is_empty() {
            return Err(GitError::EmptyRefName.into());
        }

        self.find_ref(name)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                name: name.to_string(),
            })
            .with_context(|| format!("get ref {name:?}"))
    }

    pub async fn create_ref(&self, reference: Ref) -> anyhow::Result<()> {
        validate_ref_name(&reference.name)?;

        if self.find_ref(&reference.name).await?.is_some() {
            return Err(GitError::RefAlreadyExists {
                name: reference.name,
            }
            .into());
        }

        self.send_ref_update(RefUpdate::new(reference.name.clone(), ObjectId::ZERO, reference.hash))
            .await
            .with_context(|| format!("create ref {:?}", reference.name))
    }

    pub async fn update_ref(&self, reference: Ref) -> anyhow::Result<()> {
        validate_ref_name(&reference.name)?;

        let current = self
            .find_ref(&reference.name)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                name: reference.name.clone(),
            })?;

        self.send_ref_update(RefUpdate::new(reference.name.clone(), current.hash, reference.hash))
            .await
            .with_context(|| format!("update ref {:?}", reference.name))
    }

    pub async fn delete_ref(&self, name: &str) -> anyhow::Result<()> {
        validate_ref_name(name)?;

        let current = self
            .find_ref(name)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                name: name.to_string(),
            })?;

        self.send_ref_update(RefUpdate::new(name.to_string(), current.hash, ObjectId::ZERO))
            .await
            .with_context(|| format!("delete ref {name:?}"))
    }

    async fn find_ref(&self, name: &str) -> anyhow::Result<Option<Ref>> {
        let refs = self.ls_refs(Some(name)).await?;

        Ok(refs.into_iter().find(|reference| reference.name == name))
    }

    async fn send_ref_update(&self, update: RefUpdate) -> anyhow::Result<()> {
        debug!(ref_name = %update.name, old = %update.old, new = %update.new, "sending ref update");

        let mut request = Vec::new();
        PackfileWriter::new(StorageMode::Memory)?
            .write_request(&mut request, std::slice::from_ref(&update))
            .await?;

        self.receive_pack(Box::new(Cursor::new(request))).await
    }
}
