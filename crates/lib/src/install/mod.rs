//! Interpreter installation.
//!
//! Each build configuration needs a base interpreter. How it is obtained depends on the
//! platform and the implementation family, captured by [`Toolchain`]. Downloads and unpacked
//! runtimes live in the [`CacheRoot`] and are reused across runs.

mod linux;
mod macos;
mod pypy;
mod windows;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::cache::{CacheError, CacheRoot};
use crate::configs::BuildConfiguration;
use crate::exec::ExecError;
use crate::platform::PlatformName;

pub use macos::detect_ci;

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("unknown Python implementation for {0}")]
  UnknownImplementation(String),

  #[error("{identifier}: the platform table row needs a '{field}' entry")]
  MissingField { identifier: String, field: &'static str },

  #[error("{identifier}: unsupported architecture tag '{arch}'")]
  UnsupportedArch { identifier: String, arch: String },

  #[error("{identifier}: no interpreter at {path}")]
  NotInstalled { identifier: String, path: PathBuf },

  #[error(
    "CPython {version} is not installed.\n\
     wheelwright will not perform system-wide installs when running outside of CI.\n\
     To build locally, install CPython {version} on this machine, or skip it with \
     skip = \"{skip}\"\n\nDownload link: {url}"
  )]
  LocalSystemInstall { version: String, skip: String, url: String },

  #[error("installed runtime is missing its interpreter at {0}")]
  MissingExecutable(PathBuf),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  Command(#[from] ExecError),
}

/// Interpreter family, from the first two characters of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implementation {
  CPython,
  PyPy,
}

impl Implementation {
  pub fn from_identifier(identifier: &str) -> Result<Self, InstallError> {
    match identifier.get(..2) {
      Some("cp") => Ok(Implementation::CPython),
      Some("pp") => Ok(Implementation::PyPy),
      _ => Err(InstallError::UnknownImplementation(identifier.to_string())),
    }
  }
}

/// How one configuration's interpreter is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
  /// CPython from the NuGet `python*` packages.
  NugetCPython { version: String, arch: String },
  /// CPython from the python.org framework installer.
  MacosPkgCPython { version: String, url: String },
  /// PyPy from a release archive. `executable` is relative to the unpacked root.
  ArchivePyPy { url: String, executable: PathBuf },
  /// An interpreter that is already on disk.
  Preinstalled { executable: PathBuf },
}

impl Toolchain {
  pub fn select(platform: PlatformName, config: &BuildConfiguration) -> Result<Self, InstallError> {
    let implementation = Implementation::from_identifier(&config.identifier)?;
    let url = || {
      config.url.clone().ok_or_else(|| InstallError::MissingField {
        identifier: config.identifier.clone(),
        field: "url",
      })
    };

    let toolchain = match (platform, implementation) {
      (PlatformName::Linux, _) => {
        let path = config.path.as_ref().ok_or_else(|| InstallError::MissingField {
          identifier: config.identifier.clone(),
          field: "path",
        })?;
        Toolchain::Preinstalled {
          executable: path.join("bin").join("python"),
        }
      }
      (PlatformName::Windows, Implementation::CPython) => Toolchain::NugetCPython {
        version: config.version.clone(),
        arch: config.arch.clone(),
      },
      (PlatformName::Windows, Implementation::PyPy) => Toolchain::ArchivePyPy {
        url: url()?,
        executable: PathBuf::from("python.exe"),
      },
      (PlatformName::Macos, Implementation::CPython) => Toolchain::MacosPkgCPython {
        version: config.version.clone(),
        url: url()?,
      },
      (PlatformName::Macos, Implementation::PyPy) => Toolchain::ArchivePyPy {
        url: url()?,
        executable: PathBuf::from("bin").join("pypy3"),
      },
    };
    Ok(toolchain)
  }
}

/// Provides the base interpreter for a configuration.
pub trait Installer {
  /// Returns the path of the interpreter executable. `tmp` is a scratch directory that is
  /// removed after the build.
  fn install(
    &self,
    config: &BuildConfiguration,
    tmp: &Path,
  ) -> impl Future<Output = Result<PathBuf, InstallError>> + Send;
}

/// Installs interpreters on the host, caching downloads.
#[derive(Debug, Clone)]
pub struct NativeInstaller {
  platform: PlatformName,
  cache: CacheRoot,
}

impl NativeInstaller {
  pub fn new(platform: PlatformName, cache: CacheRoot) -> Self {
    NativeInstaller { platform, cache }
  }
}

impl Installer for NativeInstaller {
  async fn install(&self, config: &BuildConfiguration, tmp: &Path) -> Result<PathBuf, InstallError> {
    let toolchain = Toolchain::select(self.platform, config)?;
    let implementation_id = config.identifier.split('-').next().unwrap_or_default();
    info!("Installing Python {implementation_id}...");

    let executable = match &toolchain {
      Toolchain::NugetCPython { version, arch } => {
        windows::install_cpython(&self.cache, &config.identifier, version, arch).await?
      }
      Toolchain::MacosPkgCPython { version, url } => macos::install_cpython(&self.cache, tmp, version, url).await?,
      Toolchain::ArchivePyPy { url, executable } => pypy::install(&self.cache, tmp, url, executable).await?,
      Toolchain::Preinstalled { executable } => linux::preinstalled(&config.identifier, executable)?,
    };

    if !executable.exists() {
      return Err(InstallError::MissingExecutable(executable));
    }
    Ok(executable)
  }
}
