//! protocol::transport
//!
//! The contract every smart HTTP transport implements.
//!
//! # Design
//!
//! The trait is async because all three exchanges are network I/O. A fetch
//! response is the set of objects the server chose to send, keyed by hash:
//! it may contain objects that were never asked for (readers cache them)
//! and may silently miss objects that were (readers retry or fall back).
//! Nothing in this crate depends on the server including extras.

use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::reference::Ref;
use crate::error::GitError;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Objects returned by one fetch exchange
pub type FetchResponse = HashMap<ObjectId, PackfileObject>;

/// Body of a `receive-pack` request
pub type PackReader = Box<dyn AsyncRead + Send + Unpin>;

/// Arguments of a protocol v2 `fetch` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Objects the client wants
    pub want: Vec<ObjectId>,
    /// History depth to send for wanted commits (0 means unlimited)
    pub deepen: usize,
    /// Treat the wanted commits as a shallow boundary
    pub shallow: bool,
    /// Send blobs; without this the server applies `filter blob:none`
    pub no_blob_filter: bool,
    /// Suppress the sideband progress channel
    pub no_progress: bool,
    /// Ask for the wanted objects only, not what they reference
    pub no_extra_objects: bool,
    /// End negotiation in this round
    pub done: bool,
}

impl FetchOptions {
    pub fn want(want: Vec<ObjectId>) -> Self {
        FetchOptions {
            want,
            no_progress: true,
            done: true,
            ..Default::default()
        }
    }

    pub fn deepen(mut self, depth: usize) -> Self {
        self.deepen = depth;
        self.shallow = true;
        self
    }

    pub fn with_blobs(mut self) -> Self {
        self.no_blob_filter = true;
        self
    }

    pub fn only_wanted(mut self) -> Self {
        self.no_extra_objects = true;
        self
    }
}

/// Failures reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server does not know (or will not serve) a wanted object
    #[error("not our ref: {0}")]
    NotOurRef(ObjectId),

    /// The server answered with a 5xx status
    #[error("server unavailable (status {status}): {message}")]
    ServerUnavailable { status: u16, message: String },

    /// `receive-pack` refused a ref update
    #[error("ref update rejected for {ref_name}: {reason}")]
    Rejected { ref_name: String, reason: String },

    /// The exchange did not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Map transport failures onto the stable error kinds callers match on
    pub fn into_git_error(self) -> anyhow::Error {
        match self {
            TransportError::NotOurRef(id) => GitError::ObjectNotFound { id }.into(),
            TransportError::ServerUnavailable { status, message } => {
                GitError::ServerUnavailable { status, message }.into()
            }
            other => other.into(),
        }
    }
}

/// Normalize an error raised by a transport call
///
/// Transports return `anyhow::Error`; a [`TransportError`] inside it is
/// converted to its [`GitError`] kind, anything else passes through.
pub fn map_transport_error(error: anyhow::Error) -> anyhow::Error {
    match error.downcast::<TransportError>() {
        Ok(transport_error) => transport_error.into_git_error(),
        Err(error) => error,
    }
}

/// A smart HTTP transport speaking protocol v2
#[async_trait]
pub trait Transport: Send + Sync {
    /// List refs, optionally restricted to names starting with `prefix`
    async fn ls_refs(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ref>>;

    /// Run one fetch exchange
    async fn fetch(&self, options: FetchOptions) -> anyhow::Result<FetchResponse>;

    /// Send a `receive-pack` request body (ref commands followed by a packfile)
    async fn receive_pack(&self, pack: PackReader) -> anyhow::Result<()>;
}
