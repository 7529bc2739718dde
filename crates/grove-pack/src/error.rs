use grove_store::StoreError;
use grove_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    /// The stream ended before a pack header was seen. Writers treat this as
    /// "nothing was written", not as a failure.
    #[error("empty pack stream")]
    EmptyPack,

    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch: trailer {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("object not found in pack: {0}")]
    ObjectNotFound(ObjectId),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("pack truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("index task panicked")]
    IndexTaskPanicked,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PackError {
    /// Whether the error comes from malformed pack content rather than I/O.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::UnsupportedVersion(_)
                | Self::ChecksumMismatch { .. }
                | Self::CorruptEntry { .. }
                | Self::CrcMismatch { .. }
                | Self::DecompressionFailed(_)
                | Self::Truncated { .. }
                | Self::IndexCorrupted(_)
        )
    }
}

pub type PackResult<T> = Result<T, PackError>;
