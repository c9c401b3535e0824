//! Engine directory layout and locking.
//!
//! ```text
//! <engine_path>/
//! ├─ LOCK          # advisory lock, one process at a time
//! ├─ buffer.log    # durable Limbo write log
//! └─ archive.log   # permanent store write log
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const BUFFER_FILE: &str = "buffer.log";
const ARCHIVE_FILE: &str = "archive.log";

/// An engine directory held under an exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct EngineDir {
    path: PathBuf,
    _lock_file: File,
}

impl EngineDir {
    /// Opens (and with `create_if_missing`, creates) the directory at `path`
    /// and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the directory is missing and may not be
    ///   created
    /// - [`CoreError::EngineLocked`] if another handle holds the lock
    /// - an I/O error if the path is not a usable directory
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )
            .into());
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::EngineLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The durable Limbo's write log.
    #[must_use]
    pub fn buffer_path(&self) -> PathBuf {
        self.path.join(BUFFER_FILE)
    }

    /// The permanent store's write log.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.path.join(ARCHIVE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("engine");
        let dir = EngineDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(path.join("LOCK").exists());
        assert_eq!(dir.path(), path);
        assert_eq!(dir.buffer_path(), path.join("buffer.log"));
        assert_eq!(dir.archive_path(), path.join("archive.log"));
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = tempdir().unwrap();
        let result = EngineDir::open(&temp.path().join("absent"), false);
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn lock_prevents_second_open_until_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("engine");
        let first = EngineDir::open(&path, true).unwrap();
        assert!(matches!(
            EngineDir::open(&path, true),
            Err(CoreError::EngineLocked)
        ));
        drop(first);
        EngineDir::open(&path, true).unwrap();
    }

    #[test]
    fn files_are_not_directories() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("file");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(
            EngineDir::open(&path, true),
            Err(CoreError::Io(_))
        ));
    }
}
