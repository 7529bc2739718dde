use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use grove_store::layout::{index_path, pack_path, PACK_DIR, TEMP_INDEX_PREFIX, TEMP_PACK_PREFIX};
use grove_store::{StagedFile, Storage};
use tracing::{debug, info, warn};

use crate::decoder::{PackDecoder, StreamDecoder};
use crate::entry::CHECKSUM_LEN;
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::synced::{synced, SyncedReader, SyncedWriter};

/// Name of the background thread that indexes a pack while it is written.
pub const INDEX_TASK_NAME: &str = "grove-index-pack";

/// Called once when a [`StreamingPackWriter`] closes, with the pack checksum
/// (all zero when there is none) and the index that was built.
pub type CloseObserver = Box<dyn FnOnce(&[u8; CHECKSUM_LEN], &PackIndex) + Send>;

/// A committed pack and its index, as root-relative paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackFile {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub object_count: usize,
    pub checksum: [u8; CHECKSUM_LEN],
}

/// Byte sink that persists a pack stream and indexes it at the same time.
///
/// Bytes go to a temp file under `objects/pack/`. A background thread reads
/// the same file behind the writer and decodes it, so when the last byte
/// arrives the index is nearly done. [`close`](Self::close) waits for the
/// decoder, then either commits `pack-<hex>.pack` plus `pack-<hex>.idx` or
/// removes the temp file.
///
/// Nothing becomes visible in the store until `close` succeeds. Dropping the
/// writer without closing it closes the stream, detaches the decoder and
/// removes the temp file.
pub struct StreamingPackWriter {
    stream: SyncedWriter,
    staged: StagedFile,
    task: JoinHandle<PackResult<PackIndex>>,
    observer: Option<CloseObserver>,
}

impl StreamingPackWriter {
    /// Start a writer that decodes with [`PackDecoder`].
    pub fn new(storage: Arc<dyn Storage>) -> PackResult<Self> {
        Self::with_decoder(storage, PackDecoder::new)
    }

    /// Start a writer whose background task decodes with the decoder built
    /// by `make_decoder`.
    pub fn with_decoder<D, F>(storage: Arc<dyn Storage>, make_decoder: F) -> PackResult<Self>
    where
        D: StreamDecoder,
        F: FnOnce(SyncedReader) -> D + Send + 'static,
    {
        let (staged, file) = StagedFile::create(storage, Path::new(PACK_DIR), TEMP_PACK_PREFIX)?;
        let reader = staged.open_reader()?;
        let (stream, reader) = synced(file, reader);

        let task = thread::Builder::new()
            .name(INDEX_TASK_NAME.into())
            .spawn(move || make_decoder(reader).decode())?;

        debug!(temp = %staged.path().display(), "pack writer started");
        Ok(Self {
            stream,
            staged,
            task,
            observer: None,
        })
    }

    /// Register the close observer, replacing any earlier one.
    pub fn on_close<F>(&mut self, observer: F)
    where
        F: FnOnce(&[u8; CHECKSUM_LEN], &PackIndex) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn bytes_written(&self) -> u64 {
        self.stream.bytes_written()
    }

    /// Temp file the stream is written to.
    pub fn temp_path(&self) -> &Path {
        self.staged.path()
    }

    /// Finish the stream.
    ///
    /// Returns `None` when the stream carried no objects, in which case the
    /// temp file is removed and nothing is written. A decode failure removes
    /// the temp file and is returned as is.
    pub fn close(self) -> PackResult<Option<PackFile>> {
        let Self {
            stream,
            staged,
            task,
            observer,
        } = self;

        let file = stream.into_inner();
        let decoded = match task.join() {
            Ok(Ok(index)) => Ok(index),
            Ok(Err(PackError::EmptyPack)) => Ok(PackIndex::empty()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PackError::IndexTaskPanicked),
        };

        let (result, index) = match decoded {
            Ok(index) => (commit(staged, file, &index), index),
            Err(e) => {
                warn!(error = %e, "pack stream failed to decode, discarding");
                drop(file);
                if let Err(cleanup) = staged.discard() {
                    warn!(error = %cleanup, "failed to remove temp pack");
                }
                (Err(e), PackIndex::empty())
            }
        };

        if let Some(observer) = observer {
            observer(&index.pack_checksum, &index);
        }
        result
    }
}

impl Write for StreamingPackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

fn commit(staged: StagedFile, file: File, index: &PackIndex) -> PackResult<Option<PackFile>> {
    if index.is_empty() {
        drop(file);
        staged.discard()?;
        debug!("pack stream carried no objects, nothing committed");
        return Ok(None);
    }

    let checksum = index.pack_checksum;
    let pack = PackFile {
        pack_path: pack_path(&checksum),
        index_path: index_path(&checksum),
        object_count: index.object_count(),
        checksum,
    };
    let storage = staged.storage().clone();

    if storage.exists(&pack.pack_path) && storage.exists(&pack.index_path) {
        drop(file);
        staged.discard()?;
        info!(pack = %index.checksum_hex(), "pack already present, temp discarded");
        return Ok(Some(pack));
    }

    // The index goes first so a visible pack always has one.
    write_index(&storage, &pack.index_path, index)?;
    if let Err(e) = staged.commit(file, &pack.pack_path) {
        remove_orphan_index(storage.as_ref(), &pack.index_path);
        return Err(e.into());
    }

    info!(
        pack = %index.checksum_hex(),
        objects = pack.object_count,
        "pack committed"
    );
    Ok(Some(pack))
}

/// Stage the encoded index next to the packs and rename it onto `path`.
fn write_index(storage: &Arc<dyn Storage>, path: &Path, index: &PackIndex) -> PackResult<()> {
    let (staged, file) =
        StagedFile::create(storage.clone(), Path::new(PACK_DIR), TEMP_INDEX_PREFIX)?;
    let mut out = io::BufWriter::new(file);
    index.write_to(&mut out)?;
    let file = out.into_inner().map_err(|e| PackError::Io(e.into_error()))?;
    staged.commit(file, path)?;
    Ok(())
}

fn remove_orphan_index(storage: &dyn Storage, path: &Path) {
    if !storage.exists(path) {
        return;
    }
    if let Err(e) = storage.remove(path) {
        warn!(path = %path.display(), error = %e, "failed to remove orphaned index");
    }
}
