use grove_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag (e.g. `"grove-blob-v1"`) and a `:` separator are fed to
/// BLAKE3 before the content, so identical bytes of different object kinds
/// never share an id.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const COMMIT: Self = Self::new("grove-commit-v1");
    pub const TREE: Self = Self::new("grove-tree-v1");
    pub const BLOB: Self = Self::new("grove-blob-v1");
    pub const TAG: Self = Self::new("grove-tag-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash a complete buffer.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut digest = self.begin();
        digest.update(data);
        digest.finalize()
    }

    /// Start an incremental hash with this hasher's domain tag.
    pub fn begin(&self) -> ContentDigest {
        let mut inner = blake3::Hasher::new();
        inner.update(self.domain.as_bytes());
        inner.update(b":");
        ContentDigest { inner, len: 0 }
    }

    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Incremental domain-separated hash, fed as content is streamed.
#[derive(Clone)]
pub struct ContentDigest {
    inner: blake3::Hasher,
    len: u64,
}

impl ContentDigest {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Content bytes hashed so far (excluding the domain tag).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(&self) -> ObjectId {
        ObjectId::from_hash(*self.inner.finalize().as_bytes())
    }
}
