//! Build orchestration.
//!
//! A run walks the build plan in order. Before the first configuration the optional
//! `before-all` hook runs once. Each configuration then goes through
//!
//! ```text
//! INSTALL -> BEFORE_BUILD? -> BUILD -> REPAIR -> TEST? -> RELOCATE
//! ```
//!
//! The first failure aborts the run: later configurations are not attempted. Intermediate
//! wheels live in per-step [`ScopedDir`]s under a [`RunDir`], which are removed however the
//! step ends.
//!
//! Tests run in a fresh virtual environment created from the build interpreter, so
//! `test-requires` never lands in a shared installation.

mod tmp;
mod types;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::configs::BuildConfiguration;
use crate::constraints::DependencyConstraints;
use crate::exec::{self, Env};
use crate::install::Installer;
use crate::options::{BuildOptions, ConstraintsSource, Options, expand_env};
use crate::platform::{PlatformName, paths};
use crate::template::{Bindings, prepare_command};

pub use tmp::{RunDir, ScopedDir};
pub use types::*;

const MACOSX_DEPLOYMENT_TARGET: &str = "10.9";

pub struct Orchestrator<'a, I> {
  options: &'a Options,
  installer: I,
  base_env: Env,
}

impl<'a, I: Installer> Orchestrator<'a, I> {
  /// Commands inherit the current process environment.
  pub fn new(options: &'a Options, installer: I) -> Self {
    Orchestrator {
      options,
      installer,
      base_env: std::env::vars().collect(),
    }
  }

  /// Replace the environment commands start from.
  pub fn with_env(mut self, env: Env) -> Self {
    self.base_env = env;
    self
  }

  pub async fn run(&self, plan: &[BuildConfiguration]) -> Result<BuildSummary, BuildError> {
    let mut summary = BuildSummary::default();
    let Some(first) = plan.first() else {
      return Ok(summary);
    };
    let globals = &self.options.globals;

    let run_dir = RunDir::new().map_err(|e| BuildError::io(std::env::temp_dir(), e))?;
    debug!(path = %run_dir.path().display(), "created run directory");
    let pinned = DependencyConstraints::pinned(&run_dir.path().join("constraints"))?;

    let first_options = self.options.build_options(&first.identifier)?;
    if !first_options.before_all.trim().is_empty() {
      info!("Running before_all...");
      let env = self.with_overrides(self.base_env.clone(), &first_options);
      let command = prepare_command(&first_options.before_all, &self.path_bindings());
      exec::shell(&command, Some(&env), None).await?;
    }

    tokio::fs::create_dir_all(&globals.output_dir)
      .await
      .map_err(|e| BuildError::io(&globals.output_dir, e))?;

    for config in plan {
      let wheel = self.build_one(config, &run_dir, &pinned).await?;
      summary.wheels.push(wheel);
    }

    Ok(summary)
  }

  async fn build_one(
    &self,
    config: &BuildConfiguration,
    run_dir: &RunDir,
    pinned: &DependencyConstraints,
  ) -> Result<BuiltWheel, BuildError> {
    let identifier = config.identifier.as_str();
    let platform = self.options.globals.platform;
    let options = self.options.build_options(identifier)?;
    info!(identifier, "Building {identifier} wheel");

    let install_dir = scoped(run_dir, "install")?;
    let python = self.installer.install(config, install_dir.path()).await?;
    let env = self.build_environment(&options, identifier, &python, pinned)?;
    exec::call(&[python.as_os_str(), OsStr::new("--version")], Some(&env), None).await?;

    let package = absolute(&self.options.globals.package_dir)?;
    let python_word = shell_word(&python.to_string_lossy());
    let mut bindings = self
      .path_bindings()
      .bind("python", python_word.clone())
      .bind("pip", format!("{python_word} -m pip"));

    if let Some(before_build) = &options.before_build {
      info!("Running before_build...");
      exec::shell(&prepare_command(before_build, &bindings), Some(&env), None).await?;
    }

    info!("Building wheel...");
    let built_dir = scoped(run_dir, "built_wheel")?;
    bindings.insert("dest_dir", shell_word(&built_dir.path().to_string_lossy()));
    exec::shell(&prepare_command(&options.build_command, &bindings), Some(&env), None).await?;
    let built = find_wheel(built_dir.path())?;
    if is_pure_python(&built) {
      return Err(ArtifactError::PurePython(built).into());
    }

    let repaired_dir = scoped(run_dir, "repaired_wheel")?;
    let repaired = if options.repair_command.trim().is_empty() {
      debug!("no repair command, keeping built wheel");
      let dest = repaired_dir.path().join(file_name(&built));
      tokio::fs::rename(&built, &dest)
        .await
        .map_err(|e| BuildError::io(&built, e))?;
      dest
    } else {
      info!("Repairing wheel...");
      let mut repair = Bindings::new()
        .bind("wheel", shell_word(&built.to_string_lossy()))
        .bind("dest_dir", shell_word(&repaired_dir.path().to_string_lossy()));
      if platform == PlatformName::Macos {
        repair.insert("delocate_archs", delocate_archs(identifier));
      }
      exec::shell(&prepare_command(&options.repair_command, &repair), Some(&env), None).await?;
      find_wheel(repaired_dir.path())?
    };

    if let Some(test_command) = &options.test_command
      && self.options.globals.test_selector.matches(identifier)?
    {
      info!("Testing wheel...");
      let venv_dir = scoped(run_dir, "venv")?;
      let (venv_python, test_env) = test_environment(&python, venv_dir.path(), &env).await?;
      self
        .test_wheel(&options, test_command, &venv_python, &repaired, &package, &test_env)
        .await?;
      release(venv_dir);
    }

    let dest = self.options.globals.output_dir.join(file_name(&repaired));
    relocate(&repaired, &dest).await?;
    let size = tokio::fs::metadata(&dest).await.map(|m| m.len()).unwrap_or(0);
    info!(identifier, wheel = %dest.display(), "Built {identifier} wheel");

    for dir in [install_dir, built_dir, repaired_dir] {
      release(dir);
    }

    Ok(BuiltWheel {
      identifier: identifier.to_string(),
      path: dest,
      size,
    })
  }

  /// Install the wheel into the test environment and run the test command there.
  async fn test_wheel(
    &self,
    options: &BuildOptions,
    test_command: &str,
    venv_python: &Path,
    wheel: &Path,
    package: &Path,
    env: &Env,
  ) -> Result<(), BuildError> {
    let project = absolute(Path::new("."))?;
    let bindings = Bindings::new()
      .bind("project", shell_word(&project.to_string_lossy()))
      .bind("package", shell_word(&package.to_string_lossy()));

    if let Some(before_test) = &options.before_test {
      exec::shell(&prepare_command(before_test, &bindings), Some(env), None).await?;
    }

    let mut requirement = wheel.as_os_str().to_owned();
    requirement.push(&options.test_extras);
    let pip: Vec<OsString> = vec![
      venv_python.as_os_str().to_owned(),
      "-m".into(),
      "pip".into(),
      "install".into(),
    ];
    let mut install_wheel = pip.clone();
    install_wheel.push(requirement);
    exec::call(&install_wheel, Some(env), None).await?;

    if !options.test_requires.is_empty() {
      let mut install_requires = pip;
      install_requires.extend(options.test_requires.iter().map(OsString::from));
      exec::call(&install_requires, Some(env), None).await?;
    }

    // Run from outside the source tree so the installed wheel is imported, not the sources.
    let home = paths::home_dir().unwrap_or_else(std::env::temp_dir);
    exec::shell(&prepare_command(test_command, &bindings), Some(env), Some(&home)).await?;
    Ok(())
  }

  /// `project` and `package` bindings for hooks that run from the working directory.
  fn path_bindings(&self) -> Bindings {
    Bindings::new()
      .bind("project", ".")
      .bind("package", shell_word(&self.options.globals.package_dir.to_string_lossy()))
  }

  fn with_overrides(&self, mut env: Env, options: &BuildOptions) -> Env {
    for (key, value) in &options.environment {
      let value = expand_env(value, &env);
      env.insert(key.clone(), value);
    }
    env
  }

  fn build_environment(
    &self,
    options: &BuildOptions,
    identifier: &str,
    python: &Path,
    pinned: &DependencyConstraints,
  ) -> Result<Env, BuildError> {
    let mut env = self.base_env.clone();
    prepend_path(&mut env, exec::bin_dir(python));
    env.insert("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), "1".to_string());

    let mut env = self.with_overrides(env, options);

    let constraints = match &options.dependency_constraints {
      ConstraintsSource::Pinned => Some(pinned),
      ConstraintsSource::Latest => None,
      ConstraintsSource::File(constraints) => Some(constraints),
    };
    if let Some(constraints) = constraints {
      let file = constraints.for_identifier(identifier)?;
      env.insert("PIP_CONSTRAINT".to_string(), file.to_string_lossy().into_owned());
    }

    if self.options.globals.platform == PlatformName::Macos {
      for (key, value) in macos_defaults(identifier) {
        env.entry(key.to_string()).or_insert_with(|| value.to_string());
      }
    }

    Ok(env)
  }
}

fn scoped(run_dir: &RunDir, name: &str) -> Result<ScopedDir, BuildError> {
  run_dir.scoped(name).map_err(|e| BuildError::io(run_dir.path(), e))
}

fn release(dir: ScopedDir) {
  let path = dir.path().to_path_buf();
  if let Err(err) = dir.release() {
    warn!(path = %path.display(), error = %err, "failed to remove temporary directory");
  }
}

/// Put `dir` first on the `PATH` entry of `env`, whatever its case.
fn prepend_path(env: &mut Env, dir: &Path) {
  let path_key = env
    .keys()
    .find(|k| k.eq_ignore_ascii_case("PATH"))
    .cloned()
    .unwrap_or_else(|| "PATH".to_string());
  let mut search = vec![dir.to_path_buf()];
  if let Some(existing) = env.get(&path_key) {
    search.extend(std::env::split_paths(existing));
  }
  if let Ok(joined) = std::env::join_paths(search) {
    env.insert(path_key, joined.to_string_lossy().into_owned());
  }
}

/// Create a virtual environment at `dir` from `python`. Returns its interpreter and
/// `build_env` with the environment activated.
async fn test_environment(python: &Path, dir: &Path, build_env: &Env) -> Result<(PathBuf, Env), BuildError> {
  exec::call(
    &[python.as_os_str(), OsStr::new("-m"), OsStr::new("venv"), dir.as_os_str()],
    Some(build_env),
    None,
  )
  .await?;
  let venv_python = venv_interpreter(dir);
  if !venv_python.is_file() {
    return Err(BuildError::Venv(dir.to_path_buf()));
  }

  let mut env = build_env.clone();
  prepend_path(&mut env, exec::bin_dir(&venv_python));
  env.insert("VIRTUAL_ENV".to_string(), dir.to_string_lossy().into_owned());
  Ok((venv_python, env))
}

#[cfg(unix)]
fn venv_interpreter(dir: &Path) -> PathBuf {
  dir.join("bin").join("python")
}

#[cfg(windows)]
fn venv_interpreter(dir: &Path) -> PathBuf {
  dir.join("Scripts").join("python.exe")
}

/// Environment defaults for macOS builds. User settings take precedence.
fn macos_defaults(identifier: &str) -> Vec<(&'static str, &'static str)> {
  let mut defaults = vec![("MACOSX_DEPLOYMENT_TARGET", MACOSX_DEPLOYMENT_TARGET)];
  if matches!(identifier.get(2..5), Some("36-" | "37-")) {
    return defaults;
  }
  if identifier.ends_with("arm64") {
    defaults.push(("_PYTHON_HOST_PLATFORM", "macosx-11.0-arm64"));
    defaults.push(("ARCHFLAGS", "-arch arm64"));
  } else if identifier.ends_with("universal2") {
    defaults.push(("_PYTHON_HOST_PLATFORM", "macosx-10.9-universal2"));
    defaults.push(("ARCHFLAGS", "-arch arm64 -arch x86_64"));
  } else if identifier.ends_with("x86_64") {
    defaults.push(("_PYTHON_HOST_PLATFORM", "macosx-10.9-x86_64"));
    defaults.push(("ARCHFLAGS", "-arch x86_64"));
  }
  defaults
}

fn delocate_archs(identifier: &str) -> &'static str {
  if identifier.ends_with("universal2") {
    "x86_64,arm64"
  } else if identifier.ends_with("arm64") {
    "arm64"
  } else {
    "x86_64"
  }
}

/// The first wheel in `dir`, by file name.
fn find_wheel(dir: &Path) -> Result<PathBuf, BuildError> {
  let entries = std::fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
  let mut wheels: Vec<PathBuf> = entries
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.path())
    .filter(|path| path.extension().is_some_and(|ext| ext == "whl"))
    .collect();
  wheels.sort();
  wheels
    .into_iter()
    .next()
    .ok_or_else(|| ArtifactError::Missing(dir.to_path_buf()).into())
}

fn is_pure_python(wheel: &Path) -> bool {
  file_name(wheel).to_string_lossy().ends_with("none-any.whl")
}

fn file_name(path: &Path) -> &OsStr {
  path.file_name().unwrap_or(path.as_os_str())
}

/// Move `from` to `dest`, replacing an existing file. Falls back to copying across
/// filesystems.
async fn relocate(from: &Path, dest: &Path) -> Result<(), BuildError> {
  if tokio::fs::symlink_metadata(dest).await.is_ok() {
    tokio::fs::remove_file(dest).await.map_err(|e| BuildError::io(dest, e))?;
  }
  if tokio::fs::rename(from, dest).await.is_err() {
    tokio::fs::copy(from, dest).await.map_err(|e| BuildError::io(dest, e))?;
    tokio::fs::remove_file(from).await.map_err(|e| BuildError::io(from, e))?;
  }
  Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, BuildError> {
  std::path::absolute(path).map_err(|e| BuildError::io(path, e))
}

#[cfg(unix)]
fn shell_word(word: &str) -> String {
  exec::quote(word)
}

#[cfg(windows)]
fn shell_word(word: &str) -> String {
  exec::quote_cmd(word)
}
