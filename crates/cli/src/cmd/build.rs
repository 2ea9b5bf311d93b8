//! Implementation of the `wheelwright build` command.
//!
//! Resolves the build plan for the target platform, then builds every configuration in order,
//! stopping at the first failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use serde::Serialize;

use wheelwright_lib::build::Orchestrator;
use wheelwright_lib::cache::CacheRoot;
use wheelwright_lib::configs::PlatformTable;
use wheelwright_lib::install::NativeInstaller;
use wheelwright_lib::options::{CommandLineArguments, Options};
use wheelwright_lib::platform::PlatformName;

use super::EXIT_NO_BUILDS;
use crate::output::{OutputFormat, Status, detail, elapsed, human_size, json, status};

#[derive(Debug, Args)]
pub struct BuildArgs {
  /// Directory of the package to build
  #[arg(default_value = ".")]
  pub package_dir: PathBuf,

  /// Platform to build for: linux, macos, windows or auto
  #[arg(long, default_value = "auto")]
  pub platform: String,

  /// Architectures to build, e.g. "auto", "native", "x86_64 i686"
  #[arg(long)]
  pub archs: Option<String>,

  /// Destination directory for built wheels
  #[arg(long)]
  pub output_dir: Option<PathBuf>,

  /// Config file (default: <package_dir>/wheelwright.toml, if present)
  #[arg(long)]
  pub config_file: Option<PathBuf>,

  /// Platform table to use instead of the built-in one
  #[arg(long)]
  pub platform_table: Option<PathBuf>,

  /// Print the selected build identifiers and exit
  #[arg(long)]
  pub print_build_identifiers: bool,

  /// Succeed when the selectors match no configurations
  #[arg(long)]
  pub allow_empty: bool,
}

#[derive(Serialize)]
struct IdentifiersOutput<'a> {
  platform: PlatformName,
  identifiers: Vec<&'a str>,
}

fn resolve_platform(platform: &str) -> Result<PlatformName> {
  if platform == "auto" {
    PlatformName::current().ok_or_else(|| anyhow!("Unable to detect platform; pass --platform"))
  } else {
    Ok(platform.parse()?)
  }
}

pub fn cmd_build(args: BuildArgs, output: OutputFormat) -> Result<ExitCode> {
  let platform = resolve_platform(&args.platform)?;

  let arguments = CommandLineArguments {
    platform,
    package_dir: args.package_dir.clone(),
    archs: args.archs.clone(),
    output_dir: args.output_dir.clone(),
    config_file: args.config_file.clone(),
    allow_empty: args.allow_empty,
  };
  let options = Options::from_arguments(&arguments).context("Failed to load options")?;
  let globals = &options.globals;

  let table = match &args.platform_table {
    Some(path) => PlatformTable::from_path(path)?,
    None => PlatformTable::embedded()?,
  };
  let plan = table
    .resolve(platform, &globals.build_selector, &globals.architectures)
    .context("Failed to resolve build plan")?;

  if args.print_build_identifiers {
    if output.is_json() {
      json(&IdentifiersOutput {
        platform,
        identifiers: plan.iter().map(|c| c.identifier.as_str()).collect(),
      })?;
    } else {
      for config in &plan {
        println!("{}", config.identifier);
      }
    }
    return Ok(ExitCode::SUCCESS);
  }

  if plan.is_empty() {
    if globals.allow_empty {
      status(Status::Note, "No build identifiers selected, nothing to do");
      return Ok(ExitCode::SUCCESS);
    }
    status(
      Status::Failed,
      &format!(
        "No build identifiers selected: {}. Pass --allow-empty to ignore this.",
        globals.build_selector
      ),
    );
    return Ok(ExitCode::from(EXIT_NO_BUILDS));
  }

  let cache = CacheRoot::from_env().context("Failed to open the toolchain cache")?;
  let installer = NativeInstaller::new(platform, cache);
  let orchestrator = Orchestrator::new(&options, installer);

  if !output.is_json() {
    status(
      Status::Note,
      &format!(
        "wheelwright {}: building {} wheel(s) for {}",
        env!("CARGO_PKG_VERSION"),
        plan.len(),
        platform
      ),
    );
  }

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(orchestrator.run(&plan))?;

  if output.is_json() {
    json(&summary)?;
  } else {
    println!();
    status(
      Status::Done,
      &format!("{} wheel(s) produced in {}", summary.wheels.len(), elapsed(start.elapsed())),
    );
    for wheel in &summary.wheels {
      let name = wheel.path.file_name().unwrap_or(wheel.path.as_os_str()).to_string_lossy();
      detail(&name, &human_size(wheel.size));
    }
  }

  Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn explicit_platform_names() {
    assert_eq!(resolve_platform("windows").unwrap(), PlatformName::Windows);
    assert!(resolve_platform("beos").is_err());
  }
}
