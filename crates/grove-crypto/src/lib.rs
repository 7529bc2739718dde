//! Hashing primitives for Grove.
//!
//! Object identities are domain-separated BLAKE3 hashes: the same bytes
//! stored as a blob and as a tree get different ids. [`ContentDigest`] is the
//! incremental form used when an object is streamed to disk.

pub mod hasher;

pub use hasher::{ContentDigest, ContentHasher};
