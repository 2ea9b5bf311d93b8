//! File-based locks guarding individual cache entries.
//!
//! Each entry `<path>` is guarded by `<path>.lock`. The lock is an OS advisory lock
//! (`flock` on Unix, `LockFileEx` on Windows) taken on an open handle, so it excludes
//! other threads and other processes alike and disappears with the handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CacheError;

/// Diagnostic record written into a held lock file.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub key: String,
}

/// An exclusive lock on one cache entry. Released on drop.
#[derive(Debug)]
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  /// Block until the lock at `lock_path` is held exclusively.
  pub fn acquire(lock_path: &Path, key: &str) -> Result<Self, CacheError> {
    let file = open_lock_file(lock_path)?;
    lock(&file, true).map_err(|source| CacheError::Lock {
      path: lock_path.to_path_buf(),
      source,
    })?;
    Self::held(file, lock_path, key)
  }

  /// Take the lock only if nobody else holds it.
  #[cfg(test)]
  pub fn try_acquire(lock_path: &Path, key: &str) -> Result<Option<Self>, CacheError> {
    let file = open_lock_file(lock_path)?;
    match lock(&file, false) {
      Ok(()) => Self::held(file, lock_path, key).map(Some),
      Err(err) if is_contended(&err) => Ok(None),
      Err(source) => Err(CacheError::Lock {
        path: lock_path.to_path_buf(),
        source,
      }),
    }
  }

  fn held(file: File, lock_path: &Path, key: &str) -> Result<Self, CacheError> {
    let lock = CacheLock {
      file,
      lock_path: lock_path.to_path_buf(),
    };
    lock.write_metadata(key).map_err(|source| CacheError::Lock {
      path: lock_path.to_path_buf(),
      source,
    })?;
    Ok(lock)
  }

  fn write_metadata(&self, key: &str) -> io::Result<()> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      key: key.to_string(),
    };

    let mut file = &self.file;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, &metadata).map_err(io::Error::other)?;
    writer.flush()
  }

  /// Reads the metadata through the held handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  #[cfg(test)]
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::Read;

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  #[cfg(test)]
  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

impl Drop for CacheLock {
  fn drop(&mut self) {
    debug!(path = %self.lock_path.display(), "released cache lock");
  }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CacheError> {
  if let Some(parent) = lock_path.parent() {
    std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
      path: parent.to_path_buf(),
      source,
    })?;
  }
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(lock_path)
    .map_err(|source| CacheError::Lock {
      path: lock_path.to_path_buf(),
      source,
    })
}

#[cfg(all(test, unix))]
fn is_contended(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(all(test, windows))]
fn is_contended(err: &io::Error) -> bool {
  use windows_sys::Win32::Foundation::ERROR_LOCK_VIOLATION;
  err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) || err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(unix)]
fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if blocking {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = if blocking {
    LOCKFILE_EXCLUSIVE_LOCK
  } else {
    LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_creates_lock_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("nested").join("tool.exe.lock");

    let lock = CacheLock::acquire(&lock_path, "nested/tool.exe").unwrap();

    assert!(lock.lock_path().exists());
  }

  #[test]
  fn lock_metadata_written() {
    let temp = TempDir::new().unwrap();
    let lock = CacheLock::acquire(&temp.path().join("entry.lock"), "entry").unwrap();

    let metadata = lock.read_metadata().unwrap();

    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.key, "entry");
    assert_eq!(metadata.pid, std::process::id());
  }

  #[test]
  fn second_holder_is_excluded_until_drop() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("entry.lock");

    let first = CacheLock::acquire(&lock_path, "entry").unwrap();
    assert!(CacheLock::try_acquire(&lock_path, "entry").unwrap().is_none());

    drop(first);
    assert!(CacheLock::try_acquire(&lock_path, "entry").unwrap().is_some());
  }
}
