//! Foundation types for Grove.
//!
//! Every other Grove crate depends on `grove-types` for [`ObjectId`], the
//! 32-byte content address shared by loose objects, pack entries and pack
//! indexes.

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::ObjectId;
