//! Client entry point
//!
//! A [`Client`] owns a transport and an optional shared object store. Each
//! public operation resolves the store it works with once (the shared one,
//! or a fresh cache scoped to that call) and threads it through every step,
//! so objects fetched early in an operation are never fetched twice.

use crate::areas::database::{MemoryStore, ObjectStore};
use crate::artifacts::objects::reference::Ref;
use crate::artifacts::protocol::transport::{
    FetchOptions, FetchResponse, PackReader, Transport, map_transport_error,
};
use std::sync::Arc;
use tracing::trace;

/// Tuning for tree traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Trees requested per fetch while walking a tree
    pub tree_batch_size: usize,
    /// Trees requested per fetch when retrying missing ones
    pub tree_retry_batch_size: usize,
    /// Attempts per tree before the walk fails
    pub max_tree_retries: usize,
    /// Fetches per walk before it is abandoned
    pub max_tree_batches: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            tree_batch_size: 10,
            tree_retry_batch_size: 5,
            max_tree_retries: 3,
            max_tree_batches: 1000,
        }
    }
}

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    store: Option<Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Client {
            transport,
            options: ClientOptions::default(),
            store: None,
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Share one object store across every operation of this client
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The store an operation should use
    pub(crate) fn store(&self) -> Arc<dyn ObjectStore> {
        match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(MemoryStore::new()),
        }
    }

    pub(crate) async fn fetch(&self, options: FetchOptions) -> anyhow::Result<FetchResponse> {
        trace!(
            want = options.want.len(),
            deepen = options.deepen,
            blobs = options.no_blob_filter,
            "fetch"
        );

        self.transport
            .fetch(options)
            .await
            .map_err(map_transport_error)
    }

    pub(crate) async fn ls_refs(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ref>> {
        self.transport
            .ls_refs(prefix)
            .await
            .map_err(map_transport_error)
    }

    pub(crate) async fn receive_pack(&self, pack: PackReader) -> anyhow::Result<()> {
        self.transport
            .receive_pack(pack)
            .await
            .map_err(map_transport_error)
    }
}
