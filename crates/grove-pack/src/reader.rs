use std::io::Read;
use std::path::Path;

use grove_store::{Storage, StoredObject};
use grove_types::ObjectId;

use crate::entry::{
    kind_from_type_byte, CHECKSUM_LEN, DELTA_TYPE_BYTE, PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION,
};
use crate::error::{PackError, PackResult};
use crate::index::{PackIndex, PackIndexEntry};
use crate::varint::decode_varint;

/// Reads objects from a committed pack using its index for random access.
#[derive(Debug)]
pub struct PackReader {
    pack_data: Vec<u8>,
    index: PackIndex,
}

impl PackReader {
    /// Wrap pack bytes and the index describing them.
    ///
    /// Checks the header and that the pack's trailer is the checksum the
    /// index was built for.
    pub fn from_bytes(pack_data: Vec<u8>, index: PackIndex) -> PackResult<Self> {
        if pack_data.len() < PACK_HEADER_LEN + CHECKSUM_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &pack_data[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(PACK_MAGIC).into(),
                actual: String::from_utf8_lossy(&pack_data[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes([pack_data[4], pack_data[5], pack_data[6], pack_data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let trailer = &pack_data[pack_data.len() - CHECKSUM_LEN..];
        if trailer != index.pack_checksum {
            return Err(PackError::ChecksumMismatch {
                expected: index.checksum_hex(),
                actual: hex_of(trailer),
            });
        }
        Ok(Self { pack_data, index })
    }

    /// Open `pack_path` and the `.idx` next to it.
    pub fn open(storage: &dyn Storage, pack_path: &Path) -> PackResult<Self> {
        let mut pack_data = Vec::new();
        storage.open(pack_path)?.read_to_end(&mut pack_data)?;
        let mut index_data = Vec::new();
        storage
            .open(&pack_path.with_extension("idx"))?
            .read_to_end(&mut index_data)?;
        let index = PackIndex::from_bytes(&index_data)?;
        Self::from_bytes(pack_data, index)
    }

    /// Read an object by ID.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<StoredObject>> {
        match self.index.lookup(id) {
            Some(entry) => self.read_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    pub fn object_count(&self) -> usize {
        self.index.object_count()
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// IDs of every object in the pack, sorted.
    pub fn object_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.index.entries().iter().map(|e| &e.id)
    }

    fn read_entry(&self, entry: &PackIndexEntry) -> PackResult<StoredObject> {
        let offset = entry.offset;
        let body_end = self.pack_data.len() - CHECKSUM_LEN;
        let mut pos = usize::try_from(offset)
            .ok()
            .filter(|&pos| pos >= PACK_HEADER_LEN && pos < body_end)
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "offset outside pack body".into(),
            })?;

        let type_byte = self.pack_data[pos];
        pos += 1;
        let kind = kind_from_type_byte(type_byte).ok_or_else(|| PackError::CorruptEntry {
            offset,
            reason: if type_byte == DELTA_TYPE_BYTE {
                "delta entries are not supported".into()
            } else {
                format!("unknown type byte: {type_byte}")
            },
        })?;

        let (size, used) = decode_varint(&self.pack_data[pos..body_end])?;
        pos += used;
        let (compressed_size, used) = decode_varint(&self.pack_data[pos..body_end])?;
        pos += used;

        let end = usize::try_from(compressed_size)
            .ok()
            .and_then(|len| pos.checked_add(len))
            .filter(|&end| end <= body_end)
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "compressed data extends beyond pack".into(),
            })?;
        let compressed = &self.pack_data[pos..end];

        if crc32fast::hash(compressed) != entry.crc32 {
            return Err(PackError::CrcMismatch { id: entry.id });
        }

        let data = zstd::decode_all(compressed)
            .map_err(|e| PackError::DecompressionFailed(format!("{}: {e}", entry.id)))?;
        if data.len() as u64 != size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: header {size}, inflated {}", data.len()),
            });
        }

        let object = StoredObject::new(kind, data);
        if object.compute_id() != entry.id {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("content does not hash to {}", entry.id),
            });
        }
        Ok(object)
    }
}

fn hex_of(bytes: &[u8]) -> String {
    let mut hash = [0u8; CHECKSUM_LEN];
    hash.copy_from_slice(bytes);
    ObjectId::from_hash(hash).to_hex()
}

#[cfg(test)]
mod tests {
    use grove_store::{ObjectKind, OsStorage};

    use super::*;
    use crate::builder::PackBuilder;

    #[test]
    fn reads_every_kind() {
        let mut builder = PackBuilder::new();
        let commit = builder.add_object(ObjectKind::Commit, b"commit body");
        let tag = builder.add_object(ObjectKind::Tag, b"v1.0");
        let (bytes, index) = builder.finish_to_bytes().unwrap();
        let reader = PackReader::from_bytes(bytes, index).unwrap();

        let obj = reader.read_object(&commit).unwrap().unwrap();
        assert_eq!(obj.kind, ObjectKind::Commit);
        assert_eq!(obj.data, b"commit body");
        assert_eq!(reader.read_object(&tag).unwrap().unwrap().kind, ObjectKind::Tag);
        assert_eq!(reader.object_ids().count(), 2);
    }

    #[test]
    fn index_for_another_pack_is_rejected() {
        let (bytes, _) = PackBuilder::new().finish_to_bytes().unwrap();
        let mut other = PackBuilder::new();
        other.add_object(ObjectKind::Blob, b"other");
        let (_, index) = other.finish_to_bytes().unwrap();
        let err = PackReader::from_bytes(bytes, index).unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch { .. }));
    }

    #[test]
    fn flipped_payload_byte_fails_crc() {
        let mut builder = PackBuilder::new();
        let id = builder.add_object(ObjectKind::Blob, &vec![1u8; 2048]);
        let (mut bytes, index) = builder.finish_to_bytes().unwrap();
        // Last payload byte, just before the trailer.
        let at = bytes.len() - CHECKSUM_LEN - 1;
        bytes[at] ^= 0xFF;
        let reader = PackReader::from_bytes(bytes, index).unwrap();
        let err = reader.read_object(&id).unwrap_err();
        assert!(matches!(err, PackError::CrcMismatch { id: bad } if bad == id));
    }

    #[test]
    fn open_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let mut builder = PackBuilder::new();
        let id = builder.add_object(ObjectKind::Blob, b"on disk");
        let (bytes, index) = builder.finish_to_bytes().unwrap();

        let pack = grove_store::layout::pack_path(&index.pack_checksum);
        std::fs::write(dir.path().join(&pack), &bytes).unwrap();
        std::fs::write(dir.path().join(pack.with_extension("idx")), index.to_bytes()).unwrap();

        let reader = PackReader::open(&storage, &pack).unwrap();
        assert_eq!(reader.read_object(&id).unwrap().unwrap().data, b"on disk");
    }

    #[test]
    fn open_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let (bytes, index) = PackBuilder::new().finish_to_bytes().unwrap();
        let pack = grove_store::layout::pack_path(&index.pack_checksum);
        std::fs::write(dir.path().join(&pack), bytes).unwrap();
        assert!(matches!(
            PackReader::open(&storage, &pack).unwrap_err(),
            PackError::Store(_)
        ));
    }
}
