mod cmd;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildArgs;
use crate::output::{OutputFormat, Status, status};

/// Build binary wheels across a matrix of interpreters and architectures
#[derive(Parser)]
#[command(name = "wheelwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build wheels for every selected configuration
  Build(BuildArgs),

  /// Show the detected platform and cache location
  Info,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  let result = match cli.command {
    Commands::Build(args) => cmd::cmd_build(args, cli.output),
    Commands::Info => cmd::cmd_info(cli.output),
  };

  match result {
    Ok(code) => code,
    Err(err) => {
      status(Status::Failed, &format!("{err:#}"));
      cmd::exit_code_for(&err)
    }
  }
}
