use std::io::{self, Write};

use grove_types::ObjectId;

use crate::entry::CHECKSUM_LEN;
use crate::error::{PackError, PackResult};

/// Magic bytes opening every index file.
pub const INDEX_MAGIC: &[u8; 4] = b"GRVI";

/// Index format version written and accepted.
pub const INDEX_VERSION: u32 = 1;

/// Where one object lives inside a pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackIndexEntry {
    pub id: ObjectId,
    /// Byte offset of the entry's type byte from the start of the pack.
    pub offset: u64,
    /// CRC32 of the entry's compressed payload.
    pub crc32: u32,
}

/// Pack index for random-access lookups.
///
/// On-disk layout:
/// ```text
/// "GRVI" | version (u32 BE)
/// fan-out: 256 x u32 BE, count of ids whose first byte <= slot
/// ids:     N x 32 bytes, sorted
/// crc32s:  N x u32 BE (parallel to ids)
/// offsets: N x u64 BE (parallel to ids)
/// pack checksum (32 bytes)
/// ```
///
/// An index with no entries means the pack stream carried no objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackIndex {
    pub version: u32,
    pub pack_checksum: [u8; CHECKSUM_LEN],
    fan_out: [u32; 256],
    entries: Vec<PackIndexEntry>,
}

impl PackIndex {
    /// Index of an empty stream: no entries, all-zero checksum.
    pub fn empty() -> Self {
        Self::build(Vec::new(), [0u8; CHECKSUM_LEN])
    }

    /// Build an index from entries in any order and the pack checksum.
    pub fn build(mut entries: Vec<PackIndexEntry>, pack_checksum: [u8; CHECKSUM_LEN]) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let mut fan_out = [0u32; 256];
        for entry in &entries {
            fan_out[entry.id.first_byte() as usize] += 1;
        }
        for slot in 1..256 {
            fan_out[slot] += fan_out[slot - 1];
        }

        Self {
            version: INDEX_VERSION,
            pack_checksum,
            fan_out,
            entries,
        }
    }

    /// Look up an object's entry by ID.
    pub fn lookup(&self, id: &ObjectId) -> Option<&PackIndexEntry> {
        let first = id.first_byte() as usize;
        let start = if first == 0 {
            0
        } else {
            self.fan_out[first - 1] as usize
        };
        let end = self.fan_out[first] as usize;
        let bucket = &self.entries[start..end];
        bucket
            .binary_search_by(|entry| entry.id.cmp(id))
            .ok()
            .map(|pos| &bucket[pos])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Entries sorted by ID.
    pub fn entries(&self) -> &[PackIndexEntry] {
        &self.entries
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn checksum_hex(&self) -> String {
        ObjectId::from_hash(self.pack_checksum).to_hex()
    }

    /// Encode into `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(INDEX_MAGIC)?;
        w.write_all(&self.version.to_be_bytes())?;
        for count in &self.fan_out {
            w.write_all(&count.to_be_bytes())?;
        }
        for entry in &self.entries {
            w.write_all(entry.id.as_bytes())?;
        }
        for entry in &self.entries {
            w.write_all(&entry.crc32.to_be_bytes())?;
        }
        for entry in &self.entries {
            w.write_all(&entry.offset.to_be_bytes())?;
        }
        w.write_all(&self.pack_checksum)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 256 * 4 + self.entries.len() * 44 + CHECKSUM_LEN);
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        buf
    }

    /// Decode an index file.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        let mut cursor = Cursor { data, pos: 0 };

        let magic = cursor.take(4, "header")?;
        if magic != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(INDEX_MAGIC).into(),
                actual: String::from_utf8_lossy(magic).into(),
            });
        }
        let version = cursor.u32("header")?;
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut fan_out = [0u32; 256];
        for slot in &mut fan_out {
            *slot = cursor.u32("fan-out")?;
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out is not monotonic".into()));
        }

        let count = fan_out[255] as usize;
        let mut ids = Vec::with_capacity(count.min(data.len() / 32));
        for _ in 0..count {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(cursor.take(32, "object ids")?);
            ids.push(ObjectId::from_hash(hash));
        }
        let mut crcs = Vec::with_capacity(ids.len());
        for _ in 0..count {
            crcs.push(cursor.u32("crc32 table")?);
        }
        let mut offsets = Vec::with_capacity(ids.len());
        for _ in 0..count {
            offsets.push(cursor.u64("offset table")?);
        }
        let mut pack_checksum = [0u8; CHECKSUM_LEN];
        pack_checksum.copy_from_slice(cursor.take(CHECKSUM_LEN, "pack checksum")?);

        let entries = ids
            .into_iter()
            .zip(crcs)
            .zip(offsets)
            .map(|((id, crc32), offset)| PackIndexEntry { id, offset, crc32 })
            .collect();
        let index = Self::build(entries, pack_checksum);
        if index.fan_out != fan_out {
            return Err(PackError::IndexCorrupted(
                "fan-out does not match object ids".into(),
            ));
        }
        Ok(index)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> PackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| PackError::IndexCorrupted(format!("{what} truncated")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> PackResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self, what: &str) -> PackResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(first: u8, second: u8, offset: u64) -> PackIndexEntry {
        let mut hash = [0u8; 32];
        hash[0] = first;
        hash[1] = second;
        PackIndexEntry {
            id: ObjectId::from_hash(hash),
            offset,
            crc32: offset as u32 * 7,
        }
    }

    #[test]
    fn empty_index() {
        let idx = PackIndex::empty();
        assert!(idx.is_empty());
        assert_eq!(idx.version, INDEX_VERSION);
        assert!(idx.fan_out.iter().all(|&c| c == 0));
    }

    #[test]
    fn lookup_across_buckets() {
        let entries = vec![entry(9, 0, 300), entry(0, 1, 12), entry(9, 1, 400), entry(255, 0, 90)];
        let idx = PackIndex::build(entries.clone(), [0u8; 32]);
        assert_eq!(idx.object_count(), 4);
        for e in &entries {
            assert_eq!(idx.lookup(&e.id), Some(e));
        }
        assert!(!idx.contains(&ObjectId::from_hash([9; 32])));
        assert_eq!(idx.fan_out[0], 1);
        assert_eq!(idx.fan_out[8], 1);
        assert_eq!(idx.fan_out[9], 3);
        assert_eq!(idx.fan_out[255], 4);
    }

    #[test]
    fn entries_are_sorted_by_id() {
        let idx = PackIndex::build(vec![entry(3, 0, 1), entry(1, 0, 2), entry(2, 0, 3)], [0u8; 32]);
        let firsts: Vec<u8> = idx.entries().iter().map(|e| e.id.first_byte()).collect();
        assert_eq!(firsts, vec![1, 2, 3]);
    }

    #[test]
    fn serialization_roundtrip() {
        let entries: Vec<_> = (0..5u8).map(|i| entry(i * 40, i, i as u64 * 50)).collect();
        let idx = PackIndex::build(entries, [0xAB; 32]);
        let parsed = PackIndex::from_bytes(&idx.to_bytes()).unwrap();
        assert_eq!(parsed, idx);
        assert_eq!(parsed.checksum_hex(), "ab".repeat(32));
    }

    #[test]
    fn from_bytes_bad_magic() {
        let err = PackIndex::from_bytes(b"BADMxxxxxxxx").unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn from_bytes_bad_version() {
        let mut data = Vec::new();
        data.extend_from_slice(INDEX_MAGIC);
        data.extend_from_slice(&99u32.to_be_bytes());
        let err = PackIndex::from_bytes(&data).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(99)));
    }

    #[test]
    fn from_bytes_truncated() {
        let idx = PackIndex::build(vec![entry(1, 1, 1)], [1u8; 32]);
        let bytes = idx.to_bytes();
        let err = PackIndex::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }

    #[test]
    fn from_bytes_rejects_inconsistent_fan_out() {
        let idx = PackIndex::build(vec![entry(1, 1, 1)], [1u8; 32]);
        let mut bytes = idx.to_bytes();
        // Claim the only id sits in bucket 0 instead of bucket 1.
        bytes[8..12].copy_from_slice(&1u32.to_be_bytes());
        let err = PackIndex::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }
}
