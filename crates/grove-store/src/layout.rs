//! Relative paths of store artifacts under a storage root.

use std::path::PathBuf;

use grove_types::ObjectId;

/// Directory holding loose objects and the pack directory.
pub const OBJECTS_DIR: &str = "objects";

/// Directory holding committed packs and their indexes.
pub const PACK_DIR: &str = "objects/pack";

/// Temp-file prefix for packs being streamed in.
pub const TEMP_PACK_PREFIX: &str = "tmp_pack_";

/// Temp-file prefix for pack indexes before they are renamed into place.
pub const TEMP_INDEX_PREFIX: &str = "tmp_idx_";

/// Temp-file prefix for loose objects being written.
pub const TEMP_OBJECT_PREFIX: &str = "tmp_obj_";

/// `objects/<2 hex>/<62 hex>`
pub fn loose_object_path(id: &ObjectId) -> PathBuf {
    let (dir, file) = id.loose_parts();
    PathBuf::from(OBJECTS_DIR).join(dir).join(file)
}

/// Base name shared by a pack and its index: `objects/pack/pack-<hex>`.
pub fn pack_base(checksum: &[u8; 32]) -> PathBuf {
    PathBuf::from(PACK_DIR).join(format!("pack-{}", hex_checksum(checksum)))
}

/// `objects/pack/pack-<hex>.pack`
pub fn pack_path(checksum: &[u8; 32]) -> PathBuf {
    pack_base(checksum).with_extension("pack")
}

/// `objects/pack/pack-<hex>.idx`
pub fn index_path(checksum: &[u8; 32]) -> PathBuf {
    pack_base(checksum).with_extension("idx")
}

fn hex_checksum(checksum: &[u8; 32]) -> String {
    ObjectId::from_hash(*checksum).to_hex()
}
