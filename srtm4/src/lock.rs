//! Advisory file locks shared between processes.
//!
//! Locks are `flock`-style locks on small files inside the cache directory.
//! They are held per open file description, so two threads of one process
//! exclude each other the same way two processes do, and the OS drops them
//! when the holder exits. Lock files are never removed: unlinking a lock file
//! while another process waits on it would let a third process lock a fresh
//! inode.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::Result;

/// An exclusive lock on a file, released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the exclusive lock on `path` is acquired, creating the file if needed.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        FileExt::lock_exclusive(&file)?;
        tracing::trace!(lock = %path.display(), "Lock acquired");

        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => tracing::trace!(lock = %self.path.display(), "Lock released"),
            // Closing the file below releases the lock anyway
            Err(e) => tracing::warn!(lock = %self.path.display(), error = %e, "Failed to unlock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let guard = LockGuard::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(guard.path(), path);
    }

    #[test]
    fn test_lock_excludes_other_threads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.lock");
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = LockGuard::acquire(&path).unwrap();

        let waiter = {
            let path = path.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let _g = LockGuard::acquire(&path).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reacquire_after_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.lock");
        drop(LockGuard::acquire(&path).unwrap());
        drop(LockGuard::acquire(&path).unwrap());
    }
}
