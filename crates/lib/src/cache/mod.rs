//! Toolchain cache.
//!
//! A [`CacheRoot`] is a directory of downloaded tools and unpacked runtimes. Entries are
//! addressed by a relative key and are never evicted. Each entry is guarded by a sibling
//! lock file, so concurrent processes populating the same key wait for each other instead of
//! racing:
//!
//! 1. lock `<root>/<key>.lock`
//! 2. return `<root>/<key>` if it already exists
//! 3. otherwise populate a staging sibling and rename it into place
//! 4. unlock (guard drop, on every exit path)
//!
//! No lock is ever held across two keys.

pub mod archive;
pub mod fetch;
pub mod lock;

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::exec::ExecError;
use crate::platform::paths;
pub use lock::{CacheLock, LockMetadata};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("invalid cache key '{0}': keys must be relative paths without '..'")]
  InvalidKey(String),

  #[error("could not determine a cache directory; set WHEELWRIGHT_CACHE_PATH")]
  NoCacheDir,

  #[error("failed to lock {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  #[error("unsupported archive format: {0}")]
  UnsupportedArchive(PathBuf),

  #[error("failed to unpack {path}: {message}")]
  Archive { path: PathBuf, message: String },

  #[error("populating cache entry {0} produced nothing at the staging path")]
  NotPopulated(PathBuf),

  #[error(transparent)]
  Command(#[from] ExecError),
}

impl CacheError {
  fn io(path: &Path, source: io::Error) -> Self {
    CacheError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Root directory of the toolchain cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
  root: PathBuf,
}

impl CacheRoot {
  /// Open (creating if needed) a cache at `root`.
  pub fn new(root: impl AsRef<Path>) -> Result<Self, CacheError> {
    let root = root.as_ref();
    std::fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))?;
    let root = dunce::canonicalize(root).map_err(|e| CacheError::io(root, e))?;
    Ok(CacheRoot { root })
  }

  /// `WHEELWRIGHT_CACHE_PATH` if set, else the per-user cache directory.
  pub fn from_env() -> Result<Self, CacheError> {
    let root = paths::cache_dir().ok_or(CacheError::NoCacheDir)?;
    Self::new(root)
  }

  pub fn path(&self) -> &Path {
    &self.root
  }

  /// Final path of the entry named by `key`.
  pub fn entry(&self, key: &str) -> Result<PathBuf, CacheError> {
    let relative = Path::new(key);
    let valid = !key.is_empty()
      && relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !valid {
      return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(self.root.join(relative))
  }

  /// Take the exclusive lock for `key`, waiting for other holders.
  pub async fn lock(&self, key: &str) -> Result<CacheLock, CacheError> {
    let lock_path = lock_path_for(&self.entry(key)?);
    let key = key.to_string();
    let join_path = lock_path.clone();
    tokio::task::spawn_blocking(move || CacheLock::acquire(&lock_path, &key))
      .await
      .map_err(|e| CacheError::Lock {
        path: join_path,
        source: io::Error::other(e),
      })?
  }

  /// Return the path for `key`, populating it with `fetch` if it is absent.
  ///
  /// `fetch` receives a staging path which it must create (as a file or a directory). The
  /// staging path is renamed onto the entry only after `fetch` succeeds, so the entry is either
  /// absent or complete.
  pub async fn ensure<F, Fut, E>(&self, key: &str, fetch: F) -> Result<PathBuf, E>
  where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<CacheError>,
  {
    let target = self.entry(key)?;
    let _lock = self.lock(key).await?;

    if target.exists() {
      debug!(path = %target.display(), "cache hit");
      return Ok(target);
    }

    let staging = staging_path_for(&target);
    remove_path(&staging).await.map_err(|e| CacheError::io(&staging, e))?;
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| CacheError::io(parent, e))?;
    }

    info!(key, "populating cache entry");
    if let Err(err) = fetch(staging.clone()).await {
      if let Err(cleanup) = remove_path(&staging).await {
        warn!(path = %staging.display(), error = %cleanup, "failed to remove staging path");
      }
      return Err(err);
    }

    if tokio::fs::symlink_metadata(&staging).await.is_err() {
      return Err(CacheError::NotPopulated(target).into());
    }
    tokio::fs::rename(&staging, &target)
      .await
      .map_err(|e| CacheError::io(&target, e))?;

    debug!(path = %target.display(), "cache entry populated");
    Ok(target)
  }

  /// Download `url` into the entry `key` unless it is already cached.
  pub async fn ensure_download(&self, key: &str, url: &str) -> Result<PathBuf, CacheError> {
    self
      .ensure(key, |staging| async move { fetch::download(url, &staging).await })
      .await
  }
}

fn lock_path_for(target: &Path) -> PathBuf {
  let mut name = target.file_name().unwrap_or_default().to_os_string();
  name.push(".lock");
  target.with_file_name(name)
}

fn staging_path_for(target: &Path) -> PathBuf {
  let mut name = std::ffi::OsString::from(".");
  name.push(target.file_name().unwrap_or_default());
  name.push(format!(".partial-{}", std::process::id()));
  target.with_file_name(name)
}

/// Remove a file or directory tree, ignoring a missing path.
pub(crate) async fn remove_path(path: &Path) -> io::Result<()> {
  match tokio::fs::symlink_metadata(path).await {
    Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
    Ok(_) => tokio::fs::remove_file(path).await,
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(err) => Err(err),
  }
}
