use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PlatformName;

/// CPU architectures a wheel can be built for.
///
/// Names follow each platform's own convention, so Windows carries `AMD64`/`x86`/`ARM64`
/// while macOS spells Apple Silicon `arm64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Architecture {
  #[serde(rename = "x86_64")]
  X86_64,
  #[serde(rename = "i686")]
  I686,
  #[serde(rename = "aarch64")]
  Aarch64,
  #[serde(rename = "ppc64le")]
  Ppc64le,
  #[serde(rename = "s390x")]
  S390x,
  #[serde(rename = "AMD64")]
  Amd64,
  #[serde(rename = "x86")]
  X86,
  #[serde(rename = "ARM64")]
  WinArm64,
  #[serde(rename = "arm64")]
  Arm64,
  #[serde(rename = "universal2")]
  Universal2,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchError {
  #[error("unknown architecture '{0}'")]
  Unknown(String),

  #[error("architecture {arch} is not available on {platform}")]
  NotOnPlatform { arch: Architecture, platform: PlatformName },

  #[error("host CPU '{0}' has no native build architecture on this platform")]
  NoNative(String),
}

const ALL: [Architecture; 10] = [
  Architecture::X86_64,
  Architecture::I686,
  Architecture::Aarch64,
  Architecture::Ppc64le,
  Architecture::S390x,
  Architecture::Amd64,
  Architecture::X86,
  Architecture::WinArm64,
  Architecture::Arm64,
  Architecture::Universal2,
];

impl Architecture {
  /// Returns the name used in identifiers and config strings
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::I686 => "i686",
      Self::Aarch64 => "aarch64",
      Self::Ppc64le => "ppc64le",
      Self::S390x => "s390x",
      Self::Amd64 => "AMD64",
      Self::X86 => "x86",
      Self::WinArm64 => "ARM64",
      Self::Arm64 => "arm64",
      Self::Universal2 => "universal2",
    }
  }

  pub fn is_32bit(&self) -> bool {
    matches!(self, Self::I686 | Self::X86)
  }

  /// Every architecture buildable on `platform`.
  pub fn all_for(platform: PlatformName) -> BTreeSet<Self> {
    let archs: &[Self] = match platform {
      PlatformName::Linux => &[Self::X86_64, Self::I686, Self::Aarch64, Self::Ppc64le, Self::S390x],
      PlatformName::Macos => &[Self::X86_64, Self::Arm64, Self::Universal2],
      PlatformName::Windows => &[Self::Amd64, Self::X86, Self::WinArm64],
    };
    archs.iter().copied().collect()
  }

  /// The architecture the host CPU runs natively, named for `platform`.
  pub fn native(platform: PlatformName) -> Result<Self, ArchError> {
    Self::native_for(platform, std::env::consts::ARCH)
  }

  fn native_for(platform: PlatformName, host: &str) -> Result<Self, ArchError> {
    let arch = match (platform, host) {
      (PlatformName::Linux, "x86_64") => Self::X86_64,
      (PlatformName::Linux, "x86") => Self::I686,
      (PlatformName::Linux, "aarch64") => Self::Aarch64,
      (PlatformName::Linux, "powerpc64") => Self::Ppc64le,
      (PlatformName::Linux, "s390x") => Self::S390x,
      (PlatformName::Macos, "x86_64") => Self::X86_64,
      (PlatformName::Macos, "aarch64") => Self::Arm64,
      (PlatformName::Windows, "x86_64") => Self::Amd64,
      (PlatformName::Windows, "x86") => Self::X86,
      (PlatformName::Windows, "aarch64") => Self::WinArm64,
      _ => return Err(ArchError::NoNative(host.to_string())),
    };
    Ok(arch)
  }

  /// Architectures built by `auto`: the native one plus whatever the host runs without
  /// emulation (32-bit on x86_64 Linux/Windows, universal2 on Apple Silicon).
  pub fn auto_for(platform: PlatformName, native: Self) -> BTreeSet<Self> {
    let mut archs = BTreeSet::from([native]);
    match (platform, native) {
      (PlatformName::Linux, Self::X86_64) => {
        archs.insert(Self::I686);
      }
      (PlatformName::Windows, Self::Amd64) => {
        archs.insert(Self::X86);
      }
      (PlatformName::Macos, Self::Arm64) => {
        archs.insert(Self::Universal2);
      }
      _ => {}
    }
    archs
  }

  /// Parse an `archs` setting: space or comma separated names and the keywords `auto`,
  /// `auto64`, `auto32`, `native` and `all`.
  pub fn parse_config(config: &str, platform: PlatformName) -> Result<BTreeSet<Self>, ArchError> {
    let mut result = BTreeSet::new();
    for token in config.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
      match token {
        "auto" => result.extend(Self::auto_for(platform, Self::native(platform)?)),
        "auto64" => result.extend(
          Self::auto_for(platform, Self::native(platform)?)
            .into_iter()
            .filter(|a| !a.is_32bit()),
        ),
        "auto32" => result.extend(
          Self::auto_for(platform, Self::native(platform)?)
            .into_iter()
            .filter(|a| a.is_32bit()),
        ),
        "native" => {
          result.insert(Self::native(platform)?);
        }
        "all" => result.extend(Self::all_for(platform)),
        name => {
          let arch: Self = name.parse()?;
          if !Self::all_for(platform).contains(&arch) {
            return Err(ArchError::NotOnPlatform { arch, platform });
          }
          result.insert(arch);
        }
      }
    }
    Ok(result)
  }

  /// Map the `arch` column of a platform table row to an architecture.
  ///
  /// Windows rows use the bitness tags `32`, `64` and `ARM64`; other platforms use
  /// the architecture name directly.
  pub fn from_table_tag(platform: PlatformName, tag: &str) -> Result<Self, ArchError> {
    match (platform, tag) {
      (PlatformName::Windows, "32") => Ok(Self::X86),
      (PlatformName::Windows, "64") => Ok(Self::Amd64),
      (PlatformName::Windows, "ARM64") => Ok(Self::WinArm64),
      (_, other) => other.parse(),
    }
  }
}

impl FromStr for Architecture {
  type Err = ArchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ALL
      .iter()
      .copied()
      .find(|a| a.as_str() == s)
      .ok_or_else(|| ArchError::Unknown(s.to_string()))
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip_through_from_str() {
    for arch in ALL {
      assert_eq!(arch.as_str().parse::<Architecture>().unwrap(), arch);
    }
  }

  #[test]
  fn explicit_list_accepts_commas_and_spaces() {
    let archs = Architecture::parse_config("x86_64, aarch64 i686", PlatformName::Linux).unwrap();
    assert_eq!(
      archs,
      BTreeSet::from([Architecture::X86_64, Architecture::I686, Architecture::Aarch64])
    );
  }

  #[test]
  fn rejects_arch_from_another_platform() {
    let err = Architecture::parse_config("AMD64", PlatformName::Linux).unwrap_err();
    assert_eq!(
      err,
      ArchError::NotOnPlatform {
        arch: Architecture::Amd64,
        platform: PlatformName::Linux
      }
    );
  }

  #[test]
  fn all_expands_to_platform_set() {
    let archs = Architecture::parse_config("all", PlatformName::Windows).unwrap();
    assert_eq!(archs, Architecture::all_for(PlatformName::Windows));
  }

  #[test]
  fn auto_adds_32bit_on_x86_64_linux() {
    let archs = Architecture::auto_for(PlatformName::Linux, Architecture::X86_64);
    assert_eq!(archs, BTreeSet::from([Architecture::X86_64, Architecture::I686]));
  }

  #[test]
  fn native_maps_host_cpu_names() {
    assert_eq!(
      Architecture::native_for(PlatformName::Macos, "aarch64").unwrap(),
      Architecture::Arm64
    );
    assert_eq!(
      Architecture::native_for(PlatformName::Windows, "x86_64").unwrap(),
      Architecture::Amd64
    );
    assert!(Architecture::native_for(PlatformName::Macos, "s390x").is_err());
  }

  #[test]
  fn windows_table_tags_use_bitness() {
    assert_eq!(
      Architecture::from_table_tag(PlatformName::Windows, "32").unwrap(),
      Architecture::X86
    );
    assert_eq!(
      Architecture::from_table_tag(PlatformName::Macos, "universal2").unwrap(),
      Architecture::Universal2
    );
  }
}
