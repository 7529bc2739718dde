use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SyncMode;
use crate::error::StoreResult;
use crate::fs::Storage;

/// A temp file that becomes visible in the store only by renaming it.
///
/// Created with [`StagedFile::create`], which also hands back the write
/// handle. Exactly one of three things happens to it:
/// - [`commit`](Self::commit) renames it onto its final path,
/// - [`discard`](Self::discard) removes it and reports failures,
/// - dropping it removes it on a best-effort basis.
pub struct StagedFile {
    storage: Arc<dyn Storage>,
    path: PathBuf,
    finished: bool,
}

impl StagedFile {
    /// Allocate a new temp target in `dir`.
    pub fn create(storage: Arc<dyn Storage>, dir: &Path, prefix: &str) -> StoreResult<(Self, File)> {
        let (file, path) = storage.temp_file(dir, prefix)?;
        debug!(path = %path.display(), "staged file created");
        let staged = Self {
            storage,
            path,
            finished: false,
        };
        Ok((staged, file))
    }

    /// Root-relative path of the temp file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Open an independent read handle onto the temp file.
    pub fn open_reader(&self) -> StoreResult<File> {
        self.storage.open(&self.path)
    }

    /// Close `file` (syncing it first if configured) and rename the temp
    /// file onto `target`.
    ///
    /// On failure the temp file is still removed when `self` drops.
    pub fn commit(mut self, file: File, target: &Path) -> StoreResult<()> {
        if self.storage.config().sync_mode == SyncMode::EveryCommit {
            file.sync_all()?;
        }
        drop(file);
        self.storage.rename(&self.path, target)?;
        self.finished = true;
        debug!(from = %self.path.display(), to = %target.display(), "staged file committed");
        Ok(())
    }

    /// Remove the temp file, reporting any failure.
    pub fn discard(mut self) -> StoreResult<()> {
        self.finished = true;
        self.storage.remove(&self.path)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.storage.remove(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove staged file");
        }
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("path", &self.path)
            .field("finished", &self.finished)
            .finish()
    }
}
