//! Advisory single-writer file locking for the beads system.
//!
//! Guards a `.beads` directory's SQLite database against two `bd import`
//! processes racing on the same files -- SQLite's own locking serializes
//! writers within one connection's transactions, but not across the WAL
//! checkpoint boundary between two independent process invocations.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors raised while acquiring or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("lock file {path} is held by another process")]
    WouldBlock { path: PathBuf },
    #[error("failed to acquire lock on {path}: {source}")]
    Acquire { path: PathBuf, source: std::io::Error },
}

/// A held advisory lock. Released automatically on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks until the lock at `path` (created if absent) is acquired.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let file = open(&path)?;
        file.lock_exclusive().map_err(|source| LockError::Acquire { path: path.clone(), source })?;
        Ok(Self { file, path })
    }

    /// Attempts to acquire the lock at `path` without blocking, returning
    /// [`LockError::WouldBlock`] if another process already holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let file = open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::WouldBlock { path }),
            Err(source) => Err(LockError::Acquire { path, source }),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open(path: &Path) -> Result<File, LockError> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|source| LockError::Open { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_and_release_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beads.lock");
        {
            let _lock = FileLock::acquire(&path).unwrap();
        }
        let _lock2 = FileLock::acquire(&path).unwrap();
    }

    #[test]
    fn try_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beads.lock");
        let _held = FileLock::acquire(&path).unwrap();
        let err = FileLock::try_acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::WouldBlock { .. }));
    }
}
