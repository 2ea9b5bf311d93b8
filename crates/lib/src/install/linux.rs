use std::path::{Path, PathBuf};

use super::InstallError;

/// Interpreters on Linux are expected at the row's `path`, as laid out in manylinux images.
pub(super) fn preinstalled(identifier: &str, executable: &Path) -> Result<PathBuf, InstallError> {
  if executable.exists() {
    Ok(executable.to_path_buf())
  } else {
    Err(InstallError::NotInstalled {
      identifier: identifier.to_string(),
      path: executable.to_path_buf(),
    })
  }
}
