//! Build configuration table and plan resolution.
//!
//! The table lists every interpreter build wheelwright knows how to produce, grouped by
//! platform. A build plan is the ordered subset of one platform's rows admitted by a
//! [`Selector`] and a set of requested architectures.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::platform::PlatformName;
use crate::platform::arch::{ArchError, Architecture};
use crate::selector::{Selector, SelectorError};

const EMBEDDED_TABLE: &str = include_str!("../resources/build-platforms.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read platform table {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid platform table: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("platform table has no section for {0}")]
  MissingPlatform(PlatformName),

  #[error("row {identifier}: {source}")]
  Arch {
    identifier: String,
    #[source]
    source: ArchError,
  },

  #[error(transparent)]
  Selector(#[from] SelectorError),
}

/// One row of the platform table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildConfiguration {
  pub version: String,
  pub arch: String,
  pub identifier: String,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub path: Option<PathBuf>,
}

impl BuildConfiguration {
  pub fn architecture(&self, platform: PlatformName) -> Result<Architecture, ConfigError> {
    Architecture::from_table_tag(platform, &self.arch).map_err(|source| ConfigError::Arch {
      identifier: self.identifier.clone(),
      source,
    })
  }
}

#[derive(Debug, Deserialize)]
struct PlatformSection {
  python_configurations: Vec<BuildConfiguration>,
}

/// Ordered rows for a single platform.
pub type BuildPlan = Vec<BuildConfiguration>;

#[derive(Debug)]
pub struct PlatformTable {
  platforms: BTreeMap<PlatformName, PlatformSection>,
}

impl PlatformTable {
  /// The table compiled into the binary.
  pub fn embedded() -> Result<Self, ConfigError> {
    Self::parse(EMBEDDED_TABLE)
  }

  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&contents)
  }

  pub fn parse(contents: &str) -> Result<Self, ConfigError> {
    let platforms = toml::from_str(contents)?;
    Ok(PlatformTable { platforms })
  }

  pub fn configurations(&self, platform: PlatformName) -> Result<&[BuildConfiguration], ConfigError> {
    self
      .platforms
      .get(&platform)
      .map(|section| section.python_configurations.as_slice())
      .ok_or(ConfigError::MissingPlatform(platform))
  }

  /// Rows of `platform` whose identifier the selector admits and whose architecture was
  /// requested, in table order.
  pub fn resolve(
    &self,
    platform: PlatformName,
    selector: &Selector,
    architectures: &BTreeSet<Architecture>,
  ) -> Result<BuildPlan, ConfigError> {
    let mut plan = Vec::new();
    for config in self.configurations(platform)? {
      let arch = config.architecture(platform)?;
      if !architectures.contains(&arch) {
        continue;
      }
      if selector.matches(&config.identifier)? {
        plan.push(config.clone());
      }
    }
    debug!(platform = %platform, selected = plan.len(), "resolved build plan");
    Ok(plan)
  }
}

/// Resolve a build plan against the embedded table.
pub fn resolve(
  platform: PlatformName,
  selector: &Selector,
  architectures: &BTreeSet<Architecture>,
) -> Result<BuildPlan, ConfigError> {
  PlatformTable::embedded()?.resolve(platform, selector, architectures)
}
