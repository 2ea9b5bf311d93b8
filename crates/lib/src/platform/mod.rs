pub mod arch;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target platform a build matrix is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformName {
  Linux,
  Macos,
  Windows,
}

impl PlatformName {
  /// Detect the platform of the running host
  ///
  /// Returns `None` if the OS is not supported
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Macos),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this platform
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Macos => "macos",
      Self::Windows => "windows",
    }
  }
}

impl fmt::Display for PlatformName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported platform '{0}' (expected linux, macos or windows)")]
pub struct UnknownPlatform(pub String);

impl FromStr for PlatformName {
  type Err = UnknownPlatform;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "linux" => Ok(Self::Linux),
      "macos" => Ok(Self::Macos),
      "windows" => Ok(Self::Windows),
      other => Err(UnknownPlatform(other.to_string())),
    }
  }
}
