use std::collections::HashSet;
use std::io::{self, BufReader, Read};

use grove_store::StoredObject;
use grove_types::ObjectId;
use tracing::debug;

use crate::entry::{
    kind_from_type_byte, CHECKSUM_LEN, DELTA_TYPE_BYTE, PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION,
};
use crate::error::{PackError, PackResult};
use crate::index::{PackIndex, PackIndexEntry};
use crate::varint::read_varint;

/// Incremental parser of a pack stream.
///
/// Yields one [`PackIndexEntry`] per object, in stream order, then verifies
/// the trailing whole-stream checksum. The sequence cannot be restarted.
/// A stream that ends before any header byte fails with
/// [`PackError::EmptyPack`], distinct from every other decode error.
pub trait StreamDecoder {
    /// Next entry, or `None` once every object in the stream was read.
    fn next_entry(&mut self) -> PackResult<Option<PackIndexEntry>>;

    /// Verify the trailer after the last entry and return the checksum.
    fn finish(self) -> PackResult<[u8; CHECKSUM_LEN]>;

    /// Drive the decoder to completion and collect its index.
    fn decode(mut self) -> PackResult<PackIndex>
    where
        Self: Sized,
    {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        let checksum = self.finish()?;
        Ok(PackIndex::build(entries, checksum))
    }
}

/// Reader that hashes and counts every byte it hands out.
struct Tracked<R> {
    inner: BufReader<R>,
    hasher: blake3::Hasher,
    offset: u64,
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.offset += n as u64;
        Ok(n)
    }
}

enum State {
    Header,
    Entries { remaining: u32 },
    Done,
}

/// [`StreamDecoder`] for grove packs.
pub struct PackDecoder<R> {
    src: Tracked<R>,
    state: State,
    seen: HashSet<ObjectId>,
}

impl<R: Read> PackDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            src: Tracked {
                inner: BufReader::new(reader),
                hasher: blake3::Hasher::new(),
                offset: 0,
            },
            state: State::Header,
            seen: HashSet::new(),
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.src.offset
    }

    fn read_header(&mut self) -> PackResult<u32> {
        let mut header = [0u8; PACK_HEADER_LEN];
        let mut filled = 0;
        while filled < PACK_HEADER_LEN {
            match self.src.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Err(PackError::EmptyPack);
        }
        if filled < PACK_HEADER_LEN {
            return Err(PackError::Truncated {
                offset: filled as u64,
            });
        }
        if &header[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(PACK_MAGIC).into(),
                actual: String::from_utf8_lossy(&header[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        debug!(count, "pack header decoded");
        Ok(count)
    }

    fn read_entry(&mut self) -> PackResult<PackIndexEntry> {
        let offset = self.src.offset;
        let stream_err = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => PackError::Truncated { offset },
            io::ErrorKind::InvalidData => PackError::CorruptEntry {
                offset,
                reason: e.to_string(),
            },
            _ => PackError::Io(e),
        };

        let mut type_byte = [0u8; 1];
        self.src.read_exact(&mut type_byte).map_err(stream_err)?;
        let kind = match type_byte[0] {
            DELTA_TYPE_BYTE => {
                return Err(PackError::CorruptEntry {
                    offset,
                    reason: "delta entries are not supported".into(),
                })
            }
            byte => kind_from_type_byte(byte).ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: format!("unknown type byte: {byte}"),
            })?,
        };

        let size = read_varint(&mut self.src).map_err(stream_err)?;
        let compressed_size = read_varint(&mut self.src).map_err(stream_err)?;

        let mut compressed = Vec::new();
        (&mut self.src)
            .take(compressed_size)
            .read_to_end(&mut compressed)
            .map_err(stream_err)?;
        if (compressed.len() as u64) < compressed_size {
            return Err(PackError::Truncated {
                offset: self.src.offset,
            });
        }

        let crc32 = crc32fast::hash(&compressed);
        let data = zstd::decode_all(compressed.as_slice())
            .map_err(|e| PackError::DecompressionFailed(format!("entry at {offset}: {e}")))?;
        if data.len() as u64 != size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: header {size}, inflated {}", data.len()),
            });
        }

        let id = StoredObject::new(kind, data).compute_id();
        if !self.seen.insert(id) {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("duplicate object {id}"),
            });
        }
        Ok(PackIndexEntry { id, offset, crc32 })
    }
}

impl<R: Read> StreamDecoder for PackDecoder<R> {
    fn next_entry(&mut self) -> PackResult<Option<PackIndexEntry>> {
        if let State::Header = self.state {
            let count = self.read_header()?;
            self.state = State::Entries { remaining: count };
        }
        match self.state {
            State::Entries { remaining } if remaining > 0 => {
                let entry = self.read_entry()?;
                self.state = State::Entries {
                    remaining: remaining - 1,
                };
                Ok(Some(entry))
            }
            _ => {
                self.state = State::Done;
                Ok(None)
            }
        }
    }

    fn finish(mut self) -> PackResult<[u8; CHECKSUM_LEN]> {
        while self.next_entry()?.is_some() {}

        let computed = *self.src.hasher.finalize().as_bytes();
        let trailer_offset = self.src.offset;
        let mut trailer = [0u8; CHECKSUM_LEN];
        // The trailer is not part of what it covers, so bypass the hasher.
        self.src
            .inner
            .read_exact(&mut trailer)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => PackError::Truncated {
                    offset: trailer_offset,
                },
                _ => PackError::Io(e),
            })?;
        if trailer != computed {
            return Err(PackError::ChecksumMismatch {
                expected: ObjectId::from_hash(trailer).to_hex(),
                actual: ObjectId::from_hash(computed).to_hex(),
            });
        }

        let mut extra = [0u8; 1];
        if self.src.inner.read(&mut extra)? != 0 {
            return Err(PackError::CorruptEntry {
                offset: trailer_offset + CHECKSUM_LEN as u64,
                reason: "trailing data after pack checksum".into(),
            });
        }
        debug!(objects = self.seen.len(), "pack stream decoded");
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PackBuilder;
    use grove_store::ObjectKind;

    fn sample_pack() -> (Vec<u8>, PackIndex) {
        let mut builder = PackBuilder::new();
        builder.add_object(ObjectKind::Commit, b"commit one");
        builder.add_object(ObjectKind::Tree, b"tree listing");
        builder.add_object(ObjectKind::Blob, &vec![7u8; 4096]);
        builder.finish_to_bytes().unwrap()
    }

    #[test]
    fn decodes_what_the_builder_wrote() {
        let (bytes, expected) = sample_pack();
        let index = PackDecoder::new(bytes.as_slice()).decode().unwrap();
        assert_eq!(index, expected);
        assert_eq!(index.object_count(), 3);
    }

    #[test]
    fn entries_come_in_stream_order() {
        let (bytes, _) = sample_pack();
        let mut decoder = PackDecoder::new(bytes.as_slice());
        let mut offsets = Vec::new();
        while let Some(entry) = decoder.next_entry().unwrap() {
            offsets.push(entry.offset);
        }
        assert_eq!(offsets[0], PACK_HEADER_LEN as u64);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        decoder.finish().unwrap();
    }

    #[test]
    fn empty_stream_is_distinguished() {
        let err = PackDecoder::new(&[][..]).decode().unwrap_err();
        assert!(matches!(err, PackError::EmptyPack));
        assert!(!err.is_decode());
    }

    #[test]
    fn zero_object_pack_decodes_to_empty_index() {
        let (bytes, _) = PackBuilder::new().finish_to_bytes().unwrap();
        let index = PackDecoder::new(bytes.as_slice()).decode().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.pack_checksum, *blake3::hash(&bytes[..PACK_HEADER_LEN]).as_bytes());
    }

    #[test]
    fn partial_header_is_truncated() {
        let err = PackDecoder::new(&b"GRVP\0"[..]).decode().unwrap_err();
        assert!(matches!(err, PackError::Truncated { offset: 5 }));
    }

    #[test]
    fn bad_magic() {
        let err = PackDecoder::new(&[0u8; 16][..]).decode().unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn truncated_body() {
        let (bytes, _) = sample_pack();
        let err = PackDecoder::new(&bytes[..bytes.len() - 40]).decode().unwrap_err();
        assert!(err.is_decode(), "{err}");
    }

    #[test]
    fn corrupted_trailer() {
        let (mut bytes, _) = sample_pack();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = PackDecoder::new(bytes.as_slice()).decode().unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch { .. }));
    }

    #[test]
    fn trailing_garbage() {
        let (mut bytes, _) = sample_pack();
        bytes.push(0);
        let err = PackDecoder::new(bytes.as_slice()).decode().unwrap_err();
        assert!(matches!(err, PackError::CorruptEntry { reason, .. } if reason.contains("trailing")));
    }

    #[test]
    fn delta_entries_are_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(PACK_MAGIC);
        bytes.extend_from_slice(&PACK_VERSION.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.push(DELTA_TYPE_BYTE);
        let err = PackDecoder::new(bytes.as_slice()).decode().unwrap_err();
        assert!(matches!(err, PackError::CorruptEntry { offset: 12, .. }));
    }
}
