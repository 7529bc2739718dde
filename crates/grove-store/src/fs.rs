use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::layout::PACK_DIR;

/// Filesystem boundary of the store.
///
/// All paths are relative to the storage root. Implementations must satisfy:
/// - `temp_file` never returns a name that is already in use.
/// - `open` on a file that another handle is still appending to returns an
///   independent read handle positioned at the start.
/// - `rename` is atomic with respect to readers of the target path.
/// - Every failure is reported, never silently ignored.
pub trait Storage: Send + Sync {
    /// Create a uniquely named file in `dir` whose name starts with `prefix`.
    ///
    /// Returns the write handle and the file's path relative to the root.
    fn temp_file(&self, dir: &Path, prefix: &str) -> StoreResult<(File, PathBuf)>;

    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> StoreResult<File>;

    /// Create (or truncate) a file for writing, creating parent directories.
    fn create(&self, path: &Path) -> StoreResult<File>;

    /// Atomically move `from` to `to`, creating the target's parent directory.
    fn rename(&self, from: &Path, to: &Path) -> StoreResult<()>;

    /// Delete a file.
    fn remove(&self, path: &Path) -> StoreResult<()>;

    fn exists(&self, path: &Path) -> bool;

    /// File names directly inside `dir`, as root-relative paths.
    ///
    /// A missing directory lists as empty.
    fn list(&self, dir: &Path) -> StoreResult<Vec<PathBuf>>;

    fn config(&self) -> &StorageConfig;
}

/// [`Storage`] backed by a directory on the local filesystem.
#[derive(Debug)]
pub struct OsStorage {
    root: PathBuf,
    config: StorageConfig,
}

impl OsStorage {
    /// Open a storage root with the default configuration, creating the
    /// object and pack directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_config(root, StorageConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: StorageConfig) -> StoreResult<Self> {
        let root = root.into();
        let pack_dir = root.join(PACK_DIR);
        fs::create_dir_all(&pack_dir).map_err(StoreError::at(&pack_dir))?;
        debug!(root = %root.display(), "opened object storage");
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn ensure_parent(full: &Path) -> StoreResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(StoreError::at(parent))?;
        }
        Ok(())
    }
}

impl Storage for OsStorage {
    fn temp_file(&self, dir: &Path, prefix: &str) -> StoreResult<(File, PathBuf)> {
        let full_dir = self.resolve(dir);
        fs::create_dir_all(&full_dir).map_err(StoreError::at(&full_dir))?;
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(&full_dir)
            .map_err(StoreError::at(&full_dir))?;
        // Lifetime of the file is managed by `StagedFile`, not by tempfile.
        let (file, full_path) = temp.keep().map_err(|e| StoreError::PathIo {
            path: full_dir.clone(),
            source: e.error,
        })?;
        let name = full_path.file_name().ok_or_else(|| StoreError::PathIo {
            path: full_path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, "temp file has no name"),
        })?;
        Ok((file, dir.join(name)))
    }

    fn open(&self, path: &Path) -> StoreResult<File> {
        let full = self.resolve(path);
        File::open(&full).map_err(StoreError::at(full))
    }

    fn create(&self, path: &Path) -> StoreResult<File> {
        let full = self.resolve(path);
        Self::ensure_parent(&full)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full)
            .map_err(StoreError::at(full))
    }

    fn rename(&self, from: &Path, to: &Path) -> StoreResult<()> {
        let (from, to) = (self.resolve(from), self.resolve(to));
        Self::ensure_parent(&to)?;
        fs::rename(&from, &to).map_err(StoreError::at(to))
    }

    fn remove(&self, path: &Path) -> StoreResult<()> {
        let full = self.resolve(path);
        fs::remove_file(&full).map_err(StoreError::at(full))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn list(&self, dir: &Path) -> StoreResult<Vec<PathBuf>> {
        let full = self.resolve(dir);
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::PathIo { path: full, source: e }),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::at(&full))?;
            if entry.file_type().map_err(StoreError::at(&full))?.is_file() {
                names.push(dir.join(entry.file_name()));
            }
        }
        names.sort();
        Ok(names)
    }

    fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn open_creates_pack_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        assert!(storage.root().join("objects/pack").is_dir());
    }

    #[test]
    fn temp_files_are_unique_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let (_, a) = storage.temp_file(Path::new(PACK_DIR), "tmp_pack_").unwrap();
        let (_, b) = storage.temp_file(Path::new(PACK_DIR), "tmp_pack_").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(PACK_DIR));
        assert!(a
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("tmp_pack_"));
        assert!(storage.exists(&a));
    }

    #[test]
    fn read_handle_sees_appended_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let (mut w, name) = storage.temp_file(Path::new("objects"), "t").unwrap();
        let mut r = storage.open(&name).unwrap();

        w.write_all(b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        w.write_all(b"de").unwrap();
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");
    }

    #[test]
    fn rename_creates_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let (_, name) = storage.temp_file(Path::new("objects"), "t").unwrap();
        let target = Path::new("objects/ab/cdef");
        storage.rename(&name, target).unwrap();
        assert!(storage.exists(target));
        assert!(!storage.exists(&name));
    }

    #[test]
    fn create_makes_parents_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let path = Path::new("objects/new/dir/file");

        storage.create(path).unwrap().write_all(b"long contents").unwrap();
        storage.create(path).unwrap().write_all(b"short").unwrap();

        let mut out = String::new();
        storage.open(path).unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "short");
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        assert!(storage.list(Path::new("nope")).unwrap().is_empty());
    }

    #[test]
    fn remove_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OsStorage::open(dir.path()).unwrap();
        let err = storage.remove(Path::new("objects/missing")).unwrap_err();
        assert!(matches!(err, StoreError::PathIo { .. }));
    }
}
