//! Exclusive lock on a store directory.
//!
//! The lock lives in a `.lock` file inside the directory and is held for the
//! lifetime of [`FileLock`]. Closing the file releases it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::storage::StorageError;

/// Exclusive, non-blocking lock on a store directory.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock on `dir`.
    ///
    /// # Errors
    /// - `Locked` if another handle holds the lock
    /// - `BackendError` if the lock file cannot be opened
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::BackendError(format!("cannot open {}: {e}", path.display())))?;

        Self::try_lock(&file, dir)?;
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File, dir: &Path) -> Result<(), StorageError> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file` and open for the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Err(StorageError::Locked(dir.display().to_string()))
        } else {
            Err(StorageError::BackendError(format!("flock failed: {err}")))
        }
    }

    #[cfg(windows)]
    fn try_lock(file: &File, dir: &Path) -> Result<(), StorageError> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };

        let handle = file.as_raw_handle() as HANDLE;
        // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result == 0 {
            return Err(StorageError::Locked(dir.display().to_string()));
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File, _dir: &Path) -> Result<(), StorageError> {
        Err(StorageError::BackendError(
            "file locking is not supported on this platform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let lock = FileLock::acquire(dir.path()).unwrap();
            assert!(lock.path().exists());
        }
        FileLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn test_second_acquire_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _held = FileLock::acquire(dir.path()).unwrap();
        let err = FileLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }
}
