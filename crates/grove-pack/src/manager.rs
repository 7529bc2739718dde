use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use grove_store::layout::PACK_DIR;
use grove_store::{Storage, StoredObject};
use grove_types::ObjectId;
use tracing::{debug, warn};

use crate::error::PackResult;
use crate::reader::PackReader;
use crate::writer::{PackFile, StreamingPackWriter};

/// The committed packs of one store.
pub struct PackManager {
    storage: Arc<dyn Storage>,
    packs: Vec<PackReader>,
}

impl PackManager {
    /// Load every pack under `objects/pack/`. Packs that fail to open are
    /// skipped with a warning.
    pub fn load(storage: Arc<dyn Storage>) -> PackResult<Self> {
        let mut packs = Vec::new();
        for path in storage.list(Path::new(PACK_DIR))? {
            if path.extension().map_or(true, |ext| ext != "pack") {
                continue;
            }
            match PackReader::open(storage.as_ref(), &path) {
                Ok(reader) => packs.push(reader),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable pack"),
            }
        }
        debug!(packs = packs.len(), "pack manager loaded");
        Ok(Self { storage, packs })
    }

    /// Read an object from whichever loaded pack holds it.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<StoredObject>> {
        for pack in &self.packs {
            if let Some(obj) = pack.read_object(id)? {
                return Ok(Some(obj));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.packs.iter().any(|p| p.contains(id))
    }

    /// Total objects across all packs.
    pub fn total_objects(&self) -> usize {
        self.packs.iter().map(|p| p.object_count()).sum()
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn packs(&self) -> &[PackReader] {
        &self.packs
    }

    /// A fresh streaming writer into this store.
    pub fn writer(&self) -> PackResult<StreamingPackWriter> {
        StreamingPackWriter::new(self.storage.clone())
    }

    /// Stream `src` into a new pack and start serving it.
    ///
    /// Returns `None` when the stream carried no objects.
    pub fn ingest<R: Read>(&mut self, mut src: R) -> PackResult<Option<PackFile>> {
        let mut writer = self.writer()?;
        // On a copy error the writer is dropped, which removes its temp file.
        io::copy(&mut src, &mut writer)?;
        let Some(pack) = writer.close()? else {
            return Ok(None);
        };

        let loaded = self
            .packs
            .iter()
            .any(|p| p.index().pack_checksum == pack.checksum);
        if !loaded {
            self.packs
                .push(PackReader::open(self.storage.as_ref(), &pack.pack_path)?);
        }
        Ok(Some(pack))
    }
}

#[cfg(test)]
mod tests {
    use grove_store::{ObjectKind, OsStorage};

    use super::*;
    use crate::builder::PackBuilder;
    use crate::error::PackError;

    fn setup() -> (tempfile::TempDir, Arc<dyn Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(OsStorage::open(dir.path()).unwrap());
        (dir, storage)
    }

    #[test]
    fn empty_store() {
        let (_dir, storage) = setup();
        let mgr = PackManager::load(storage).unwrap();
        assert_eq!(mgr.pack_count(), 0);
        assert_eq!(mgr.total_objects(), 0);
        assert!(!mgr.contains(&ObjectId::null()));
        assert!(mgr.read_object(&ObjectId::null()).unwrap().is_none());
    }

    #[test]
    fn ingest_then_reload() {
        let (_dir, storage) = setup();
        let mut builder = PackBuilder::new();
        let a = builder.add_object(ObjectKind::Blob, b"alpha");
        let b = builder.add_object(ObjectKind::Tree, b"beta");
        let (bytes, _) = builder.finish_to_bytes().unwrap();

        let mut mgr = PackManager::load(storage.clone()).unwrap();
        let pack = mgr.ingest(bytes.as_slice()).unwrap().unwrap();
        assert_eq!(pack.object_count, 2);
        assert_eq!(mgr.packs()[0].index().pack_checksum, pack.checksum);
        assert_eq!(mgr.read_object(&a).unwrap().unwrap().data, b"alpha");

        // Ingesting the same stream again neither fails nor loads it twice.
        mgr.ingest(bytes.as_slice()).unwrap();
        assert_eq!(mgr.pack_count(), 1);

        let reloaded = PackManager::load(storage).unwrap();
        assert_eq!(reloaded.pack_count(), 1);
        assert_eq!(reloaded.total_objects(), 2);
        assert!(reloaded.contains(&b));
    }

    #[test]
    fn ingest_of_nothing() {
        let (_dir, storage) = setup();
        let mut mgr = PackManager::load(storage).unwrap();
        assert_eq!(mgr.ingest(io::empty()).unwrap(), None);
        assert_eq!(mgr.pack_count(), 0);
    }

    #[test]
    fn ingest_of_garbage_fails() {
        let (_dir, storage) = setup();
        let mut mgr = PackManager::load(storage.clone()).unwrap();
        let err = mgr.ingest(&b"definitely not a pack"[..]).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
        assert!(storage.list(Path::new(PACK_DIR)).unwrap().is_empty());
    }

    #[test]
    fn load_skips_broken_packs() {
        let (dir, storage) = setup();
        std::fs::write(dir.path().join(PACK_DIR).join("pack-broken.pack"), b"junk").unwrap();
        let mgr = PackManager::load(storage).unwrap();
        assert_eq!(mgr.pack_count(), 0);
    }
}
