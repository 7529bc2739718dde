//! Pack files for Grove.
//!
//! A pack is a stream of zstd-compressed, CRC-checked objects closed by a
//! BLAKE3 checksum. Packs usually arrive from a peer, so the central piece
//! here is ingestion: a [`StreamingPackWriter`] persists the incoming stream
//! while a background thread indexes the bytes already on disk.
//!
//! # Architecture
//!
//! - **synced**: one appender and one trailing reader over a growing file
//! - **StreamDecoder** / **PackDecoder**: incremental parser producing index entries
//! - **PackIndex** (`.idx`): fan-out table + sorted IDs for O(log n) lookups
//! - **StreamingPackWriter**: write, index concurrently, commit or discard on close
//! - **PackBuilder**: encodes whole objects into a pack stream
//! - **PackReader** / **PackManager**: random-access reads from committed packs

pub mod builder;
pub mod decoder;
pub mod entry;
pub mod error;
pub mod index;
pub mod manager;
pub mod reader;
pub mod synced;
mod varint;
pub mod writer;

pub use builder::PackBuilder;
pub use decoder::{PackDecoder, StreamDecoder};
pub use entry::PackEntry;
pub use error::{PackError, PackResult};
pub use index::{PackIndex, PackIndexEntry};
pub use manager::PackManager;
pub use reader::PackReader;
pub use synced::{synced, SyncedReader, SyncedWriter};
pub use writer::{CloseObserver, PackFile, StreamingPackWriter};
