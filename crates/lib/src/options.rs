//! Configuration file loading and per-identifier option resolution.
//!
//! Options come from `wheelwright.toml` (or an explicit `--config-file`). Per-build values are
//! layered, last writer wins:
//!
//! 1. built-in defaults
//! 2. top-level keys
//! 3. the `[linux]` / `[macos]` / `[windows]` table for the target platform
//! 4. every `[[overrides]]` entry whose `select` matches the identifier, in file order
//!
//! `environment` tables merge key by key instead of being replaced. Keys keep the position
//! they were first written at, so later values can refer to earlier ones.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::constraints::{ConstraintsError, DependencyConstraints};
use crate::platform::PlatformName;
use crate::platform::arch::{ArchError, Architecture};
use crate::selector::{PatternSet, Selector, SelectorError};

/// File looked up in the package directory when no config file is given.
pub const DEFAULT_CONFIG_FILE: &str = "wheelwright.toml";

pub const DEFAULT_BUILD_COMMAND: &str = "{python} -m pip wheel {package} --wheel-dir={dest_dir} --no-deps";

const BUILD_KEYS: &[&str] = &[
  "before-all",
  "before-build",
  "build-command",
  "repair-command",
  "test-command",
  "before-test",
  "test-requires",
  "test-extras",
  "dependency-constraints",
  "environment",
];

const SELECTION_KEYS: &[&str] = &["build", "skip", "test-skip", "archs"];

const GLOBAL_ONLY_KEYS: &[&str] = &[
  "requires-python",
  "prerelease-pythons",
  "output-dir",
  "linux",
  "macos",
  "windows",
  "overrides",
];

#[derive(Debug, Error)]
pub enum OptionsError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("unknown option '{key}' in {section}")]
  UnknownKey { key: String, section: String },

  #[error(transparent)]
  Selector(#[from] SelectorError),

  #[error(transparent)]
  Arch(#[from] ArchError),

  #[error(transparent)]
  Constraints(#[from] ConstraintsError),
}

/// A command option: a single string or a list joined with ` && `.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSetting {
  One(String),
  Many(Vec<String>),
}

impl CommandSetting {
  fn joined(&self, sep: &str) -> String {
    match self {
      CommandSetting::One(s) => s.clone(),
      CommandSetting::Many(items) => items.join(sep),
    }
  }
}

/// Per-build keys, as written in one section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildLayer {
  pub before_all: Option<CommandSetting>,
  pub before_build: Option<CommandSetting>,
  pub build_command: Option<CommandSetting>,
  pub repair_command: Option<CommandSetting>,
  pub test_command: Option<CommandSetting>,
  pub before_test: Option<CommandSetting>,
  pub test_requires: Option<CommandSetting>,
  pub test_extras: Option<CommandSetting>,
  pub dependency_constraints: Option<PathBuf>,
  #[serde(default)]
  pub environment: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformLayer {
  pub build: Option<String>,
  pub skip: Option<String>,
  pub test_skip: Option<String>,
  pub archs: Option<String>,
  #[serde(flatten)]
  pub options: BuildLayer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Override {
  pub select: String,
  #[serde(flatten)]
  pub options: BuildLayer,
}

/// The parsed config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
  pub build: Option<String>,
  pub skip: Option<String>,
  pub test_skip: Option<String>,
  pub archs: Option<String>,
  pub requires_python: Option<String>,
  pub prerelease_pythons: Option<bool>,
  pub output_dir: Option<PathBuf>,
  #[serde(default)]
  pub linux: PlatformLayer,
  #[serde(default)]
  pub macos: PlatformLayer,
  #[serde(default)]
  pub windows: PlatformLayer,
  #[serde(default)]
  pub overrides: Vec<Override>,
  #[serde(flatten)]
  pub options: BuildLayer,
}

impl ConfigFile {
  pub fn load(path: &Path) -> Result<Self, OptionsError> {
    let contents = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&contents, path)
  }

  /// `origin` is only used in error messages.
  pub fn parse(contents: &str, origin: &Path) -> Result<Self, OptionsError> {
    let parse_err = |source| OptionsError::Parse {
      path: origin.to_path_buf(),
      source,
    };
    let raw: toml::Table = toml::from_str(contents).map_err(parse_err)?;
    validate_keys(&raw)?;
    toml::from_str(contents).map_err(parse_err)
  }

  fn platform(&self, platform: PlatformName) -> &PlatformLayer {
    match platform {
      PlatformName::Linux => &self.linux,
      PlatformName::Macos => &self.macos,
      PlatformName::Windows => &self.windows,
    }
  }
}

fn validate_keys(raw: &toml::Table) -> Result<(), OptionsError> {
  let unknown = |key: &str, section: &str| OptionsError::UnknownKey {
    key: key.to_string(),
    section: section.to_string(),
  };
  let is_build_key = |key: &str| BUILD_KEYS.contains(&key);

  for (key, value) in raw {
    let key = key.as_str();
    if !(is_build_key(key) || SELECTION_KEYS.contains(&key) || GLOBAL_ONLY_KEYS.contains(&key)) {
      return Err(unknown(key, "the top level"));
    }
    match (key, value) {
      ("linux" | "macos" | "windows", toml::Value::Table(table)) => {
        if let Some(bad) = table
          .keys()
          .find(|k| !(is_build_key(k.as_str()) || SELECTION_KEYS.contains(&k.as_str())))
        {
          return Err(unknown(bad.as_str(), &format!("[{key}]")));
        }
      }
      ("overrides", toml::Value::Array(items)) => {
        for table in items.iter().filter_map(toml::Value::as_table) {
          if let Some(bad) = table
            .keys()
            .find(|k| !(is_build_key(k.as_str()) || k.as_str() == "select"))
          {
            return Err(unknown(bad.as_str(), "[[overrides]]"));
          }
        }
      }
      _ => {}
    }
  }
  Ok(())
}

/// Settings supplied on the command line. `None` defers to the config file.
#[derive(Debug, Clone)]
pub struct CommandLineArguments {
  pub platform: PlatformName,
  pub package_dir: PathBuf,
  pub archs: Option<String>,
  pub output_dir: Option<PathBuf>,
  pub config_file: Option<PathBuf>,
  pub allow_empty: bool,
}

impl CommandLineArguments {
  pub fn new(platform: PlatformName, package_dir: impl Into<PathBuf>) -> Self {
    CommandLineArguments {
      platform,
      package_dir: package_dir.into(),
      archs: None,
      output_dir: None,
      config_file: None,
      allow_empty: false,
    }
  }
}

/// Options shared by every build in a run.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
  pub platform: PlatformName,
  pub package_dir: PathBuf,
  pub output_dir: PathBuf,
  pub build_selector: Selector,
  pub test_selector: Selector,
  pub architectures: BTreeSet<Architecture>,
  pub allow_empty: bool,
}

/// Fully resolved directives for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
  pub before_all: String,
  pub before_build: Option<String>,
  pub build_command: String,
  pub repair_command: String,
  pub test_command: Option<String>,
  pub before_test: Option<String>,
  pub test_requires: Vec<String>,
  /// Already bracketed, e.g. `[test,speedups]`, or empty.
  pub test_extras: String,
  /// Overrides in the order they were written.
  pub environment: IndexMap<String, String>,
  pub dependency_constraints: ConstraintsSource,
}

/// Where pip constraints for a build come from.
///
/// `dependency-constraints` accepts `"pinned"` (the default), `"latest"` or `""` for no
/// constraints, or a path to a constraints file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintsSource {
  /// The pins bundled with wheelwright.
  Pinned,
  /// No constraints, pip resolves the newest versions.
  Latest,
  File(DependencyConstraints),
}

impl BuildOptions {
  /// Built-in defaults for `platform`.
  pub fn defaults(platform: PlatformName) -> Self {
    let repair_command = match platform {
      PlatformName::Linux => "auditwheel repair -w {dest_dir} {wheel}",
      PlatformName::Macos => {
        "delocate-listdeps {wheel} && delocate-wheel --require-archs {delocate_archs} -w {dest_dir} {wheel}"
      }
      PlatformName::Windows => "",
    };
    BuildOptions {
      before_all: String::new(),
      before_build: None,
      build_command: DEFAULT_BUILD_COMMAND.to_string(),
      repair_command: repair_command.to_string(),
      test_command: None,
      before_test: None,
      test_requires: Vec::new(),
      test_extras: String::new(),
      environment: IndexMap::new(),
      dependency_constraints: ConstraintsSource::Pinned,
    }
  }
}

fn non_empty(s: String) -> Option<String> {
  if s.trim().is_empty() { None } else { Some(s) }
}

#[derive(Debug, Default)]
struct Merged {
  before_all: Option<String>,
  before_build: Option<String>,
  build_command: Option<String>,
  repair_command: Option<String>,
  test_command: Option<String>,
  before_test: Option<String>,
  test_requires: Option<Vec<String>>,
  test_extras: Option<String>,
  dependency_constraints: Option<PathBuf>,
  environment: IndexMap<String, String>,
}

impl Merged {
  fn apply(&mut self, layer: &BuildLayer) {
    let command = |setting: &Option<CommandSetting>| setting.as_ref().map(|s| s.joined(" && "));
    if let Some(v) = command(&layer.before_all) {
      self.before_all = Some(v);
    }
    if let Some(v) = command(&layer.before_build) {
      self.before_build = Some(v);
    }
    if let Some(v) = command(&layer.build_command) {
      self.build_command = Some(v);
    }
    if let Some(v) = command(&layer.repair_command) {
      self.repair_command = Some(v);
    }
    if let Some(v) = command(&layer.test_command) {
      self.test_command = Some(v);
    }
    if let Some(v) = command(&layer.before_test) {
      self.before_test = Some(v);
    }
    if let Some(setting) = &layer.test_requires {
      let requires = match setting {
        CommandSetting::One(s) => s.split_whitespace().map(str::to_string).collect(),
        CommandSetting::Many(items) => items.clone(),
      };
      self.test_requires = Some(requires);
    }
    if let Some(setting) = &layer.test_extras {
      self.test_extras = Some(setting.joined(","));
    }
    if let Some(path) = &layer.dependency_constraints {
      self.dependency_constraints = Some(path.clone());
    }
    self
      .environment
      .extend(layer.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
  }
}

/// Resolved options for a whole run.
#[derive(Debug, Clone)]
pub struct Options {
  pub globals: GlobalOptions,
  file: ConfigFile,
}

impl Options {
  /// Load the config file named by `args` (or the default one in the package directory,
  /// when present) and resolve the global options.
  pub fn from_arguments(args: &CommandLineArguments) -> Result<Self, OptionsError> {
    let file = match &args.config_file {
      Some(path) => ConfigFile::load(path)?,
      None => {
        let default = args.package_dir.join(DEFAULT_CONFIG_FILE);
        if default.is_file() {
          ConfigFile::load(&default)?
        } else {
          ConfigFile::default()
        }
      }
    };
    Self::new(args, file)
  }

  pub fn new(args: &CommandLineArguments, file: ConfigFile) -> Result<Self, OptionsError> {
    let platform_layer = file.platform(args.platform);
    let pick = |platform: &Option<String>, global: &Option<String>, default: &str| {
      platform.clone().or_else(|| global.clone()).unwrap_or_else(|| default.to_string())
    };

    let build = pick(&platform_layer.build, &file.build, "*");
    let skip = pick(&platform_layer.skip, &file.skip, "");
    let test_skip = pick(&platform_layer.test_skip, &file.test_skip, "");
    let archs = match &args.archs {
      Some(archs) => archs.clone(),
      None => pick(&platform_layer.archs, &file.archs, "auto"),
    };
    let requires_python = file.requires_python.as_deref().filter(|s| !s.trim().is_empty());

    let globals = GlobalOptions {
      platform: args.platform,
      package_dir: args.package_dir.clone(),
      output_dir: args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("wheelhouse")),
      build_selector: Selector::build(
        &build,
        &skip,
        requires_python,
        file.prerelease_pythons.unwrap_or(false),
      )?,
      test_selector: Selector::test(&test_skip)?,
      architectures: Architecture::parse_config(&archs, args.platform)?,
      allow_empty: args.allow_empty,
    };
    debug!(build_selector = %globals.build_selector, archs = %archs, "resolved global options");

    Ok(Options { globals, file })
  }

  /// Options for one identifier.
  pub fn build_options(&self, identifier: &str) -> Result<BuildOptions, OptionsError> {
    let platform = self.globals.platform;
    let mut merged = Merged::default();
    merged.apply(&self.file.options);
    merged.apply(&self.file.platform(platform).options);
    for entry in &self.file.overrides {
      if PatternSet::parse(&entry.select)?.matches(identifier) {
        merged.apply(&entry.options);
      }
    }

    let defaults = BuildOptions::defaults(platform);
    let dependency_constraints = match merged.dependency_constraints {
      None => ConstraintsSource::Pinned,
      Some(path) => match path.to_str().map(str::trim) {
        Some("pinned") => ConstraintsSource::Pinned,
        Some("" | "latest") => ConstraintsSource::Latest,
        _ => ConstraintsSource::File(DependencyConstraints::new(path)?),
      },
    };
    let test_extras = merged.test_extras.unwrap_or_default();

    Ok(BuildOptions {
      before_all: merged.before_all.unwrap_or(defaults.before_all),
      before_build: merged.before_build.and_then(non_empty),
      build_command: merged
        .build_command
        .and_then(non_empty)
        .unwrap_or(defaults.build_command),
      repair_command: merged.repair_command.unwrap_or(defaults.repair_command),
      test_command: merged.test_command.and_then(non_empty),
      before_test: merged.before_test.and_then(non_empty),
      test_requires: merged.test_requires.unwrap_or(defaults.test_requires),
      test_extras: if test_extras.is_empty() {
        test_extras
      } else {
        format!("[{test_extras}]")
      },
      environment: merged.environment,
      dependency_constraints,
    })
  }
}

static ENV_REFERENCE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap());

/// Expand `$NAME` and `${NAME}` in `value` from `env`. Unset names expand to nothing.
pub fn expand_env(value: &str, env: &BTreeMap<String, String>) -> String {
  ENV_REFERENCE
    .replace_all(value, |caps: &regex::Captures<'_>| {
      let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
      env.get(name).cloned().unwrap_or_default()
    })
    .into_owned()
}
