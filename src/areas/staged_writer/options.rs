use crate::artifacts::protocol::packfile::StorageMode;

/// Settings of a staged writer session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Where staged objects wait until they are pushed
    pub storage_mode: StorageMode,
}

impl WriterOptions {
    pub fn with_storage_mode(mut self, storage_mode: StorageMode) -> Self {
        self.storage_mode = storage_mode;
        self
    }
}
