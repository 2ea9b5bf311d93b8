//! Temporary directories for a run.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tracing::warn;

/// Root scratch directory for one orchestrator run, removed on drop.
#[derive(Debug)]
pub struct RunDir {
  dir: TempDir,
  counter: AtomicUsize,
}

impl RunDir {
  pub fn new() -> io::Result<Self> {
    let dir = tempfile::Builder::new().prefix("wheelwright-run-").tempdir()?;
    Ok(RunDir {
      dir,
      counter: AtomicUsize::new(0),
    })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Create a fresh, uniquely numbered subdirectory such as `3-built_wheel`.
  pub fn scoped(&self, name: &str) -> io::Result<ScopedDir> {
    let n = self.counter.fetch_add(1, Ordering::Relaxed);
    let path = self.dir.path().join(format!("{n}-{name}"));
    std::fs::create_dir(&path)?;
    Ok(ScopedDir { path, released: false })
  }
}

/// A directory that is deleted by [`ScopedDir::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct ScopedDir {
  path: PathBuf,
  released: bool,
}

impl ScopedDir {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn release(mut self) -> io::Result<()> {
    self.released = true;
    remove_if_present(&self.path)
  }
}

impl Drop for ScopedDir {
  fn drop(&mut self) {
    if self.released {
      return;
    }
    if let Err(err) = remove_if_present(&self.path) {
      warn!(path = %self.path.display(), error = %err, "failed to remove temporary directory");
    }
  }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
  match std::fs::remove_dir_all(path) {
    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scoped_dirs_are_numbered_and_removed() {
    let run = RunDir::new().unwrap();

    let first = run.scoped("install").unwrap();
    let second = run.scoped("built_wheel").unwrap();
    std::fs::write(second.path().join("x.whl"), b"").unwrap();

    assert!(first.path().ends_with("0-install"));
    assert!(second.path().ends_with("1-built_wheel"));

    let second_path = second.path().to_path_buf();
    second.release().unwrap();
    assert!(!second_path.exists());

    let first_path = first.path().to_path_buf();
    drop(first);
    assert!(!first_path.exists());
  }

  #[test]
  fn run_dir_removed_on_drop() {
    let run = RunDir::new().unwrap();
    let root = run.path().to_path_buf();
    let _leaked = run.scoped("repaired_wheel").unwrap();

    drop(run);

    assert!(!root.exists());
  }

  #[test]
  fn release_tolerates_missing_dir() {
    let run = RunDir::new().unwrap();
    let dir = run.scoped("gone").unwrap();
    std::fs::remove_dir(dir.path()).unwrap();

    dir.release().unwrap();
  }
}
