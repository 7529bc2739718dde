use std::collections::HashSet;

use grove_store::{ObjectKind, StoredObject};
use grove_types::ObjectId;

use crate::entry::{type_byte, PackEntry, PACK_MAGIC, PACK_VERSION};
use crate::error::{PackError, PackResult};
use crate::index::{PackIndex, PackIndexEntry};
use crate::varint::encode_varint;

const ZSTD_LEVEL: i32 = 3;

/// Assembles a pack stream from whole objects.
///
/// This is the producing side of what [`StreamingPackWriter`](crate::StreamingPackWriter)
/// ingests: sending peers and tests use it to build the bytes.
#[derive(Default)]
pub struct PackBuilder {
    entries: Vec<PackEntry>,
    seen: HashSet<ObjectId>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object. Returns its ID; adding the same object twice keeps
    /// a single copy.
    pub fn add_object(&mut self, kind: ObjectKind, data: &[u8]) -> ObjectId {
        let id = kind.hasher().hash(data);
        if self.seen.insert(id) {
            self.entries.push(PackEntry {
                id,
                kind,
                data: data.to_vec(),
            });
        }
        id
    }

    pub fn add_stored_object(&mut self, obj: &StoredObject) -> ObjectId {
        self.add_object(obj.kind, &obj.data)
    }

    /// Number of objects queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the pack and the index describing it.
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, PackIndex)> {
        let mut pack = Vec::new();
        let mut index_entries = Vec::with_capacity(self.entries.len());

        pack.extend_from_slice(PACK_MAGIC);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for entry in &self.entries {
            let offset = pack.len() as u64;
            pack.push(type_byte(entry.kind));

            let compressed = zstd::encode_all(entry.data.as_slice(), ZSTD_LEVEL)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
            encode_varint(&mut pack, entry.data.len() as u64);
            encode_varint(&mut pack, compressed.len() as u64);

            let crc32 = crc32fast::hash(&compressed);
            pack.extend_from_slice(&compressed);

            index_entries.push(PackIndexEntry {
                id: entry.id,
                offset,
                crc32,
            });
        }

        let checksum = *blake3::hash(&pack).as_bytes();
        pack.extend_from_slice(&checksum);

        Ok((pack, PackIndex::build(index_entries, checksum)))
    }
}
