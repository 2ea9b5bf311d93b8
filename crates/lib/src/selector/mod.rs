//! Build identifier selection.
//!
//! A [`Selector`] decides whether a build identifier such as `cp310-manylinux_x86_64`
//! takes part in a run. It combines build and skip [`PatternSet`]s with an optional
//! version constraint and the prerelease gate.
//!
//! # Example
//!
//! ```
//! use wheelwright_lib::selector::Selector;
//!
//! let selector = Selector::build("cp{36,37}-*", "*-win32", None, false).unwrap();
//! assert!(selector.matches("cp36-win_amd64").unwrap());
//! assert!(!selector.matches("cp37-win32").unwrap());
//! assert!(!selector.matches("cp38-win_amd64").unwrap());
//! ```

pub mod braces;
pub mod glob;
pub mod version;

use std::fmt;

use semver::Version;
use thiserror::Error;

use crate::consts::{PRERELEASE_SKIP, SYNTHETIC_PATCH};
use glob::Glob;
pub use version::VersionConstraint;

#[derive(Debug, Error)]
pub enum SelectorError {
  #[error("invalid pattern '{pattern}': {source}")]
  InvalidPattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("invalid version constraint '{0}'")]
  InvalidConstraint(String),

  #[error("malformed build identifier '{0}': expected an implementation tag followed by version digits")]
  MalformedIdentifier(String),
}

/// Whitespace-separated wildcard patterns, each brace-expanded before matching.
///
/// An empty set matches nothing.
#[derive(Debug, Clone)]
pub struct PatternSet {
  source: String,
  globs: Vec<Glob>,
}

impl PatternSet {
  pub fn parse(patterns: &str) -> Result<Self, SelectorError> {
    let mut globs = Vec::new();
    for pattern in patterns.split_whitespace() {
      for expanded in braces::expand(pattern) {
        let glob = Glob::new(&expanded).map_err(|source| SelectorError::InvalidPattern {
          pattern: pattern.to_string(),
          source,
        })?;
        globs.push(glob);
      }
    }
    Ok(Self {
      source: patterns.trim().to_string(),
      globs,
    })
  }

  pub fn matches(&self, identifier: &str) -> bool {
    self.globs.iter().any(|glob| glob.is_match(identifier))
  }

  pub fn is_empty(&self) -> bool {
    self.globs.is_empty()
  }

  pub fn as_str(&self) -> &str {
    &self.source
  }
}

/// Inclusion policy for build identifiers. Immutable once built.
#[derive(Debug, Clone)]
pub struct Selector {
  build: PatternSet,
  skip: PatternSet,
  requires_python: Option<VersionConstraint>,
  allow_prerelease: bool,
  prerelease: PatternSet,
}

impl Selector {
  /// Selector for the build matrix.
  ///
  /// `build` must be non-empty to select anything; pass `*` to build everything.
  pub fn build(
    build: &str,
    skip: &str,
    requires_python: Option<&str>,
    allow_prerelease: bool,
  ) -> Result<Self, SelectorError> {
    let requires_python = requires_python
      .map(str::trim)
      .filter(|constraint| !constraint.is_empty())
      .map(str::parse::<VersionConstraint>)
      .transpose()?;
    Ok(Self {
      build: PatternSet::parse(build)?,
      skip: PatternSet::parse(skip)?,
      requires_python,
      allow_prerelease,
      prerelease: PatternSet::parse(PRERELEASE_SKIP)?,
    })
  }

  /// Selector deciding which built wheels get tested.
  ///
  /// Everything that was built is eligible, so there is no version gate and prereleases
  /// pass; only `skip` narrows it.
  pub fn test(skip: &str) -> Result<Self, SelectorError> {
    Self::build("*", skip, None, true)
  }

  /// Returns true if `identifier` should be included.
  ///
  /// With a version constraint set, identifiers must carry at least two version digits
  /// before the first `-`; anything else is a [`SelectorError::MalformedIdentifier`].
  pub fn matches(&self, identifier: &str) -> Result<bool, SelectorError> {
    if let Some(constraint) = &self.requires_python {
      let (major, minor) = version_family(identifier)?;
      if !constraint.contains(&Version::new(major, minor, SYNTHETIC_PATCH)) {
        return Ok(false);
      }
    }

    if !self.allow_prerelease && self.prerelease.matches(identifier) {
      return Ok(false);
    }

    Ok(self.build.matches(identifier) && !self.skip.matches(identifier))
  }

  pub fn requires_python(&self) -> Option<&VersionConstraint> {
    self.requires_python.as_ref()
  }
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Selector(build={:?}", self.build.as_str())?;
    if !self.skip.is_empty() {
      write!(f, ", skip={:?}", self.skip.as_str())?;
    }
    if let Some(constraint) = &self.requires_python {
      write!(f, ", requires_python={:?}", constraint.to_string())?;
    }
    if self.allow_prerelease {
      write!(f, ", prerelease=true")?;
    }
    write!(f, ")")
  }
}

/// Extract `(major, minor)` from an identifier like `cp310-…` → `(3, 10)`.
pub fn version_family(identifier: &str) -> Result<(u64, u64), SelectorError> {
  let malformed = || SelectorError::MalformedIdentifier(identifier.to_string());

  let prefix = identifier.split('-').next().unwrap_or_default();
  let digits = prefix.get(2..).ok_or_else(malformed)?;
  if digits.len() < 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
    return Err(malformed());
  }
  let major = digits[..1].parse().map_err(|_| malformed())?;
  let minor = digits[1..].parse().map_err(|_| malformed())?;
  Ok((major, minor))
}
