//! Dependency-constraint file selection.
//!
//! A base file `constraints.txt` may have per-interpreter siblings such as
//! `constraints-python310.txt`. The most specific existing file wins.
//!
//! wheelwright bundles its own pins for build tooling; [`DependencyConstraints::pinned`]
//! writes them to disk so pip can read them.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConstraintsError {
  #[error("dependency constraints file {path} is not readable: {source}")]
  Missing {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot derive a version token from '{0}'")]
  BadVersion(String),

  #[error("failed to write bundled constraints to {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Bundled constraint files, base first.
const PINNED: &[(&str, &str)] = &[
  ("constraints.txt", include_str!("../resources/constraints.txt")),
  (
    "constraints-python36.txt",
    include_str!("../resources/constraints-python36.txt"),
  ),
];

#[derive(Debug, Clone, Eq)]
pub struct DependencyConstraints {
  base: PathBuf,
}

impl DependencyConstraints {
  /// `base` must exist; it is stored canonicalized.
  pub fn new(base: impl AsRef<Path>) -> Result<Self, ConstraintsError> {
    let base = base.as_ref();
    let base = dunce::canonicalize(base).map_err(|source| ConstraintsError::Missing {
      path: base.to_path_buf(),
      source,
    })?;
    Ok(DependencyConstraints { base })
  }

  /// Write the bundled pins into `dir` and resolve against them.
  pub fn pinned(dir: &Path) -> Result<Self, ConstraintsError> {
    let write_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source: std::io::Error| ConstraintsError::Write { path, source }
    };
    std::fs::create_dir_all(dir).map_err(write_err(dir))?;
    for (name, contents) in PINNED {
      let path = dir.join(name);
      std::fs::write(&path, contents).map_err(write_err(&path))?;
    }
    Self::new(dir.join(PINNED[0].0))
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  /// Constraints for a dotted runtime version such as `3.10.1`.
  pub fn for_version(&self, version: &str) -> Result<PathBuf, ConstraintsError> {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
      (Some(major), Some(minor)) if is_digits(major) && is_digits(minor) => Ok(self.for_token(&format!("{major}{minor}"))),
      _ => Err(ConstraintsError::BadVersion(version.to_string())),
    }
  }

  /// Constraints for a build identifier such as `cp310-manylinux_x86_64`.
  pub fn for_identifier(&self, identifier: &str) -> Result<PathBuf, ConstraintsError> {
    let prefix = identifier.split('-').next().unwrap_or_default();
    match prefix.get(2..) {
      Some(token) if token.len() >= 2 && is_digits(token) => Ok(self.for_token(token)),
      _ => Err(ConstraintsError::BadVersion(identifier.to_string())),
    }
  }

  /// Accepts either a dotted version or an identifier.
  pub fn resolve_for(&self, version_or_identifier: &str) -> Result<PathBuf, ConstraintsError> {
    if version_or_identifier.contains('.') {
      self.for_version(version_or_identifier)
    } else {
      self.for_identifier(version_or_identifier)
    }
  }

  fn for_token(&self, token: &str) -> PathBuf {
    let stem = self.base.file_stem().unwrap_or_default().to_string_lossy();
    let name = match self.base.extension() {
      Some(ext) => format!("{stem}-python{token}.{}", ext.to_string_lossy()),
      None => format!("{stem}-python{token}"),
    };
    let specific = self.base.with_file_name(name);
    if specific.exists() { specific } else { self.base.clone() }
  }
}

fn is_digits(s: &str) -> bool {
  !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl PartialEq for DependencyConstraints {
  fn eq(&self, other: &Self) -> bool {
    self.base == other.base
  }
}

impl fmt::Display for DependencyConstraints {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.base.display())
  }
}
