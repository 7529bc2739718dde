use std::path::PathBuf;

use grove_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {id}: computed {computed}")]
    HashMismatch { id: ObjectId, computed: ObjectId },

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific store path.
    #[error("I/O error on {path}: {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// An object writer received a different number of bytes than declared.
    #[error("object size mismatch: declared {declared}, written {written}")]
    SizeMismatch { declared: u64, written: u64 },

    /// Unknown object kind name in a loose object header.
    #[error("unknown object kind: {0}")]
    UnknownKind(String),
}

impl StoreError {
    pub(crate) fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::PathIo { path, source }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
