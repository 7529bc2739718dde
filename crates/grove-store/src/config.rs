/// Durability strategy for staged files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` every staged file before it is renamed into place.
    EveryCommit,
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Configuration for an [`OsStorage`](crate::OsStorage) root.
#[derive(Clone, Debug, Default)]
pub struct StorageConfig {
    /// Sync strategy applied when staged files are committed.
    pub sync_mode: SyncMode,
}
