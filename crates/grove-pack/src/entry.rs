use grove_store::ObjectKind;
use grove_types::ObjectId;

/// Magic bytes opening every pack stream.
pub const PACK_MAGIC: &[u8; 4] = b"GRVP";

/// Pack format version written and accepted.
pub const PACK_VERSION: u32 = 1;

/// Magic + version + object count.
pub const PACK_HEADER_LEN: usize = 12;

/// BLAKE3 trailer closing every pack stream.
pub const CHECKSUM_LEN: usize = 32;

/// Type byte reserved for delta entries, which this store never resolves.
pub const DELTA_TYPE_BYTE: u8 = 6;

/// Type byte for a full object of the given kind.
pub fn type_byte(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    }
}

/// Parse a type byte. Deltas and unknown bytes yield `None`.
pub fn kind_from_type_byte(byte: u8) -> Option<ObjectKind> {
    match byte {
        1 => Some(ObjectKind::Commit),
        2 => Some(ObjectKind::Tree),
        3 => Some(ObjectKind::Blob),
        4 => Some(ObjectKind::Tag),
        _ => None,
    }
}

/// An object queued for a pack.
#[derive(Clone, Debug)]
pub struct PackEntry {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Uncompressed data.
    pub data: Vec<u8>,
}
