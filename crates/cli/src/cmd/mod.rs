mod build;
mod info;

use std::process::ExitCode;

use wheelwright_lib::build::BuildError;

pub use build::{BuildArgs, cmd_build};
pub use info::cmd_info;

/// Exit code for a configuration or usage problem.
pub const EXIT_USAGE: u8 = 2;
/// Exit code when the selectors leave nothing to build.
pub const EXIT_NO_BUILDS: u8 = 3;

/// Failures while building exit with 1, everything else is treated as a usage error.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
  match err.downcast_ref::<BuildError>() {
    Some(
      BuildError::Command(_)
      | BuildError::Spawn { .. }
      | BuildError::Artifact(_)
      | BuildError::Install(_)
      | BuildError::Venv(_)
      | BuildError::Io { .. },
    ) => ExitCode::FAILURE,
    _ => ExitCode::from(EXIT_USAGE),
  }
}
