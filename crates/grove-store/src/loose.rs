use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use grove_crypto::ContentDigest;
use grove_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::fs::Storage;
use crate::layout::{loose_object_path, OBJECTS_DIR, TEMP_OBJECT_PREFIX};
use crate::object::{decode_header, encode_header, ObjectKind, StoredObject};
use crate::staging::StagedFile;
use crate::traits::ObjectStore;

const ZSTD_LEVEL: i32 = 3;

/// Streams a single object into its loose, content-addressed path.
///
/// The header and content go through a zstd encoder into a staged temp file
/// while the content is hashed. [`close`](Self::close) checks the declared
/// size and renames the temp file to `objects/<2 hex>/<62 hex>`.
pub struct ObjectWriter {
    staged: StagedFile,
    encoder: zstd::stream::write::Encoder<'static, File>,
    digest: ContentDigest,
    kind: ObjectKind,
    declared: u64,
}

impl ObjectWriter {
    pub fn new(storage: Arc<dyn Storage>, kind: ObjectKind, size: u64) -> StoreResult<Self> {
        let (staged, file) =
            StagedFile::create(storage, Path::new(OBJECTS_DIR), TEMP_OBJECT_PREFIX)?;
        let mut encoder = zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)?;
        encoder.write_all(&encode_header(kind, size))?;
        Ok(Self {
            staged,
            encoder,
            digest: kind.hasher().begin(),
            kind,
            declared: size,
        })
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Content bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.digest.len()
    }

    /// Finish the object and commit it. Returns its ID.
    pub fn close(self) -> StoreResult<ObjectId> {
        let written = self.digest.len();
        if written != self.declared {
            return Err(StoreError::SizeMismatch {
                declared: self.declared,
                written,
            });
        }
        let id = self.digest.finalize();
        let file = self.encoder.finish()?;
        self.staged.commit(file, &loose_object_path(&id))?;
        debug!(id = %id.short_hex(), kind = %self.kind, size = written, "loose object written");
        Ok(id)
    }

    /// Drop the object without committing it.
    pub fn abort(self) -> StoreResult<()> {
        drop(self.encoder);
        self.staged.discard()
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.digest.len() + buf.len() as u64 > self.declared {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("object exceeds declared size of {} bytes", self.declared),
            ));
        }
        let n = self.encoder.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// [`ObjectStore`] over loose objects in a [`Storage`] root.
pub struct LooseObjectStore {
    storage: Arc<dyn Storage>,
}

impl LooseObjectStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Start streaming a new object of a known size.
    pub fn writer(&self, kind: ObjectKind, size: u64) -> StoreResult<ObjectWriter> {
        ObjectWriter::new(self.storage.clone(), kind, size)
    }
}

impl ObjectStore for LooseObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let path = loose_object_path(id);
        if !self.storage.exists(&path) {
            return Ok(None);
        }
        let raw = zstd::stream::decode_all(self.storage.open(&path)?)?;
        let (kind, size, body) = decode_header(&raw).map_err(|e| match e {
            StoreError::CorruptObject { reason, .. } => StoreError::CorruptObject { id: *id, reason },
            other => other,
        })?;
        if body.len() as u64 != size {
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: format!("header declares {size} bytes, found {}", body.len()),
            });
        }
        let object = StoredObject::new(kind, body.to_vec());
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(object))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if self.storage.exists(&loose_object_path(&id)) {
            return Ok(id);
        }
        let mut writer = self.writer(object.kind, object.size)?;
        writer.write_all(&object.data)?;
        writer.close()
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.storage.exists(&loose_object_path(id)))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let path = loose_object_path(id);
        if !self.storage.exists(&path) {
            return Ok(false);
        }
        self.storage.remove(&path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsStorage;

    fn setup() -> (tempfile::TempDir, Arc<dyn Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(OsStorage::open(dir.path()).unwrap());
        (dir, storage)
    }

    fn temp_objects(storage: &Arc<dyn Storage>) -> usize {
        storage
            .list(Path::new(OBJECTS_DIR))
            .unwrap()
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(TEMP_OBJECT_PREFIX))
            })
            .count()
    }

    #[test]
    fn writer_commits_to_two_level_path() {
        let (dir, storage) = setup();
        let mut writer = ObjectWriter::new(storage.clone(), ObjectKind::Blob, 11).unwrap();
        assert_eq!(writer.kind(), ObjectKind::Blob);
        writer.write_all(b"hello ").unwrap();
        assert_eq!(writer.written(), 6);
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.written(), 11);
        let id = writer.close().unwrap();

        assert_eq!(id, ObjectKind::Blob.hasher().hash(b"hello world"));
        let hex = id.to_hex();
        assert!(dir.path().join("objects").join(&hex[..2]).join(&hex[2..]).is_file());
        assert_eq!(temp_objects(&storage), 0);
    }

    #[test]
    fn short_write_is_rejected_and_cleaned_up() {
        let (_dir, storage) = setup();
        let mut writer = ObjectWriter::new(storage.clone(), ObjectKind::Blob, 10).unwrap();
        writer.write_all(b"abc").unwrap();
        let err = writer.close().unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch {
                declared: 10,
                written: 3
            }
        ));
        assert_eq!(temp_objects(&storage), 0);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let (_dir, storage) = setup();
        let mut writer = ObjectWriter::new(storage, ObjectKind::Blob, 2).unwrap();
        let err = writer.write_all(b"abc").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn abort_leaves_nothing_behind() {
        let (_dir, storage) = setup();
        let mut writer = ObjectWriter::new(storage.clone(), ObjectKind::Tag, 3).unwrap();
        writer.write_all(b"tag").unwrap();
        writer.abort().unwrap();
        assert_eq!(temp_objects(&storage), 0);
    }

    #[test]
    fn store_roundtrip() {
        let (_dir, storage) = setup();
        let store = LooseObjectStore::new(storage);
        let object = StoredObject::new(ObjectKind::Commit, b"commit body".to_vec());

        let id = store.write(&object).unwrap();
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.read(&id).unwrap(), Some(object.clone()));

        // Idempotent.
        assert_eq!(store.write(&object).unwrap(), id);

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert_eq!(store.read(&id).unwrap(), None);
    }

    #[test]
    fn read_detects_content_swap() {
        let (dir, storage) = setup();
        let store = LooseObjectStore::new(storage);
        let a = store
            .write(&StoredObject::new(ObjectKind::Blob, b"aaa".to_vec()))
            .unwrap();
        let b = store
            .write(&StoredObject::new(ObjectKind::Blob, b"bbb".to_vec()))
            .unwrap();

        let root = dir.path();
        std::fs::copy(
            root.join(loose_object_path(&b)),
            root.join(loose_object_path(&a)),
        )
        .unwrap();

        let err = store.read(&a).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { id, .. } if id == a));
    }

    #[test]
    fn batch_defaults() {
        let (_dir, storage) = setup();
        let store = LooseObjectStore::new(storage);
        let objects = vec![
            StoredObject::new(ObjectKind::Blob, b"one".to_vec()),
            StoredObject::new(ObjectKind::Tree, b"two".to_vec()),
        ];
        let ids = store.write_batch(&objects).unwrap();
        let read = store.read_batch(&ids).unwrap();
        assert_eq!(read[0].as_ref(), Some(&objects[0]));
        assert_eq!(read[1].as_ref(), Some(&objects[1]));
    }
}
