//! Version specifier sets such as `>=3.8, !=3.9.*`.
//!
//! Only release segments (up to `major.minor.patch`) are understood; missing segments
//! compare as zero.

use std::fmt;
use std::str::FromStr;

use semver::Version;

use super::SelectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Compatible,
  Equal,
  NotEqual,
  GreaterEqual,
  LessEqual,
  Greater,
  Less,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
  op: Op,
  version: Version,
  /// Number of release segments written in the clause.
  segments: usize,
  wildcard: bool,
}

/// A comma-separated set of version clauses, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
  source: String,
  clauses: Vec<Clause>,
}

impl VersionConstraint {
  pub fn contains(&self, version: &Version) -> bool {
    self.clauses.iter().all(|clause| clause.admits(version))
  }
}

impl Clause {
  fn admits(&self, candidate: &Version) -> bool {
    match self.op {
      Op::Equal if self.wildcard => prefix_eq(candidate, &self.version, self.segments),
      Op::NotEqual if self.wildcard => !prefix_eq(candidate, &self.version, self.segments),
      Op::Equal => candidate == &self.version,
      Op::NotEqual => candidate != &self.version,
      Op::GreaterEqual => candidate >= &self.version,
      Op::LessEqual => candidate <= &self.version,
      Op::Greater => candidate > &self.version,
      Op::Less => candidate < &self.version,
      Op::Compatible => candidate >= &self.version && prefix_eq(candidate, &self.version, self.segments - 1),
    }
  }
}

fn prefix_eq(candidate: &Version, target: &Version, segments: usize) -> bool {
  let lhs = [candidate.major, candidate.minor, candidate.patch];
  let rhs = [target.major, target.minor, target.patch];
  lhs[..segments] == rhs[..segments]
}

fn parse_clause(raw: &str) -> Result<Clause, SelectorError> {
  let invalid = || SelectorError::InvalidConstraint(raw.to_string());

  const OPERATORS: [(&str, Op); 7] = [
    ("~=", Op::Compatible),
    ("==", Op::Equal),
    ("!=", Op::NotEqual),
    (">=", Op::GreaterEqual),
    ("<=", Op::LessEqual),
    (">", Op::Greater),
    ("<", Op::Less),
  ];

  let (op, rest) = OPERATORS
    .iter()
    .find_map(|(prefix, op)| raw.strip_prefix(prefix).map(|rest| (*op, rest.trim())))
    .ok_or_else(invalid)?;

  let (number, wildcard) = match rest.strip_suffix(".*") {
    Some(number) => (number, true),
    None => (rest, false),
  };
  if wildcard && !matches!(op, Op::Equal | Op::NotEqual) {
    return Err(invalid());
  }

  let parts = number
    .split('.')
    .map(|part| part.parse::<u64>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|_| invalid())?;
  if parts.is_empty() || parts.len() > 3 || (op == Op::Compatible && parts.len() < 2) {
    return Err(invalid());
  }

  let segment = |i: usize| parts.get(i).copied().unwrap_or(0);
  Ok(Clause {
    op,
    version: Version::new(segment(0), segment(1), segment(2)),
    segments: parts.len(),
    wildcard,
  })
}

impl FromStr for VersionConstraint {
  type Err = SelectorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let clauses = s
      .split(',')
      .map(str::trim)
      .filter(|clause| !clause.is_empty())
      .map(parse_clause)
      .collect::<Result<Vec<_>, _>>()?;
    if clauses.is_empty() {
      return Err(SelectorError::InvalidConstraint(s.to_string()));
    }
    Ok(Self {
      source: s.trim().to_string(),
      clauses,
    })
  }
}

impl fmt::Display for VersionConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn admits(constraint: &str, version: &str) -> bool {
    let constraint: VersionConstraint = constraint.parse().unwrap();
    constraint.contains(&Version::parse(version).unwrap())
  }

  #[test]
  fn lower_bound_admits_every_patch() {
    assert!(admits(">=3.8", "3.8.99"));
    assert!(admits(">=3.8", "3.10.99"));
    assert!(!admits(">=3.8", "3.7.99"));
  }

  #[test]
  fn clauses_are_anded() {
    assert!(admits(">=3.7, <3.10", "3.9.99"));
    assert!(!admits(">=3.7, <3.10", "3.10.99"));
  }

  #[test]
  fn wildcard_equality() {
    assert!(admits("==3.9.*", "3.9.99"));
    assert!(!admits("!=3.9.*", "3.9.99"));
    assert!(admits("!=3.9.*", "3.10.99"));
  }

  #[test]
  fn compatible_release() {
    assert!(admits("~=3.8", "3.11.99"));
    assert!(!admits("~=3.8", "4.0.0"));
    assert!(admits("~=3.8.1", "3.8.99"));
    assert!(!admits("~=3.8.1", "3.9.0"));
  }

  #[test]
  fn exact_equality_pads_missing_segments() {
    assert!(admits("==3.8", "3.8.0"));
    assert!(!admits("==3.8", "3.8.99"));
  }

  #[test]
  fn rejects_malformed_constraints() {
    assert!("".parse::<VersionConstraint>().is_err());
    assert!("3.8".parse::<VersionConstraint>().is_err());
    assert!(">=3.8rc1".parse::<VersionConstraint>().is_err());
    assert!(">=3.*".parse::<VersionConstraint>().is_err());
    assert!("~=3".parse::<VersionConstraint>().is_err());
  }
}
