use std::fmt;
use std::str::FromStr;

use grove_crypto::ContentHasher;
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Domain-separated hasher that names objects of this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tree => &ContentHasher::TREE,
            Self::Blob => &ContentHasher::BLOB,
            Self::Tag => &ContentHasher::TAG,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

/// A stored object: kind tag + raw data + cached size.
///
/// The store never interprets `data`; it is keyed only by its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Content-addressed id of this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }
}

/// Header framing a loose object: `"<kind> <size>\0"`.
pub(crate) fn encode_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    format!("{kind} {size}\0").into_bytes()
}

/// Split a decoded loose object into its kind, declared size and body.
pub(crate) fn decode_header(raw: &[u8]) -> StoreResult<(ObjectKind, u64, &[u8])> {
    let corrupt = |reason: &str| StoreError::CorruptObject {
        id: ObjectId::null(),
        reason: reason.to_string(),
    };
    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| corrupt("missing header terminator"))?;
    let header = std::str::from_utf8(&raw[..nul]).map_err(|_| corrupt("header is not utf-8"))?;
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| corrupt("malformed header"))?;
    let kind: ObjectKind = kind.parse()?;
    let size: u64 = size.parse().map_err(|_| corrupt("malformed size"))?;
    Ok((kind, size, &raw[nul + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut raw = encode_header(ObjectKind::Tree, 5);
        raw.extend_from_slice(b"hello");
        let (kind, size, body) = decode_header(&raw).unwrap();
        assert_eq!(kind, ObjectKind::Tree);
        assert_eq!(size, 5);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn header_without_terminator_is_corrupt() {
        let err = decode_header(b"blob 5").unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn header_with_unknown_kind() {
        let err = decode_header(b"widget 1\0x").unwrap_err();
        assert!(matches!(err, StoreError::UnknownKind(k) if k == "widget"));
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let data = b"same data".to_vec();
        let blob = StoredObject::new(ObjectKind::Blob, data.clone());
        let tree = StoredObject::new(ObjectKind::Tree, data);
        assert_ne!(blob.compute_id(), tree.compute_id());
    }

    #[test]
    fn kind_display_and_parse() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            assert_eq!(kind.to_string().parse::<ObjectKind>().unwrap(), kind);
        }
    }
}
