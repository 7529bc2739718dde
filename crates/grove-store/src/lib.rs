//! Content-addressed object storage for Grove.
//!
//! Objects are immutable and named by their hash. Everything that lands in
//! the store goes through the same staging protocol: bytes are written to a
//! uniquely named temp file, then renamed into their content-addressed path
//! in a single filesystem operation. Readers of the store therefore never see
//! a half-written object or pack.
//!
//! # Layout
//!
//! ```text
//! <root>/objects/<2 hex>/<62 hex>      loose objects
//! <root>/objects/pack/pack-<hex>.pack  committed packs
//! <root>/objects/pack/pack-<hex>.idx   their indexes
//! ```
//!
//! # Pieces
//!
//! - [`Storage`] / [`OsStorage`] -- the filesystem boundary
//! - [`StagedFile`] -- temp target that is renamed on commit and removed otherwise
//! - [`ObjectWriter`] -- streams one object into its loose path
//! - [`LooseObjectStore`] -- [`ObjectStore`] over loose objects

pub mod config;
pub mod error;
pub mod fs;
pub mod layout;
pub mod loose;
pub mod object;
pub mod staging;
pub mod traits;

pub use config::{StorageConfig, SyncMode};
pub use error::{StoreError, StoreResult};
pub use fs::{OsStorage, Storage};
pub use loose::{LooseObjectStore, ObjectWriter};
pub use object::{ObjectKind, StoredObject};
pub use staging::StagedFile;
pub use traits::ObjectStore;
