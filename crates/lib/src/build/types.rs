use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::constraints::ConstraintsError;
use crate::exec::{CommandError, ExecError};
use crate::install::InstallError;
use crate::options::OptionsError;
use crate::selector::SelectorError;

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error(
    "Build failed because a pure Python wheel was generated: {0}\n\n\
     If you intend to build a pure-Python wheel, you don't need wheelwright; use \
     `pip wheel -w DEST_DIR .` instead.\n\n\
     Otherwise, check that the package actually compiles an extension, for example through \
     `ext_modules` in setup.py."
  )]
  PurePython(PathBuf),

  #[error("no wheel was produced in {0}")]
  Missing(PathBuf),
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Command(#[from] CommandError),

  #[error("failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Artifact(#[from] ArtifactError),

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error(transparent)]
  Options(#[from] OptionsError),

  #[error(transparent)]
  Selector(#[from] SelectorError),

  #[error(transparent)]
  Constraints(#[from] ConstraintsError),

  #[error("virtual environment at {0} has no interpreter")]
  Venv(PathBuf),

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl From<ExecError> for BuildError {
  fn from(err: ExecError) -> Self {
    match err {
      ExecError::Spawn { command, source } => BuildError::Spawn { command, source },
      ExecError::Failed(err) => BuildError::Command(err),
    }
  }
}

impl BuildError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    BuildError::Io {
      path: path.into(),
      source,
    }
  }

  /// The failed external command, including one run while installing an interpreter.
  pub fn command(&self) -> Option<&CommandError> {
    match self {
      BuildError::Command(err) => Some(err),
      BuildError::Install(InstallError::Command(ExecError::Failed(err))) => Some(err),
      BuildError::Install(InstallError::Cache(crate::cache::CacheError::Command(ExecError::Failed(err)))) => Some(err),
      _ => None,
    }
  }
}

/// One wheel moved into the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltWheel {
  pub identifier: String,
  pub path: PathBuf,
  pub size: u64,
}

/// Result of a successful run, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
  pub wheels: Vec<BuiltWheel>,
}
