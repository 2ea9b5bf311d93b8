//! External command execution.
//!
//! Every command is echoed as `+ <command>` through `tracing` before it runs. Output is
//! read line by line while the command runs: [`call`] and [`shell`] log each line at info
//! level, [`call_capture`] at debug level. On failure the collected output travels inside
//! the [`CommandError`] so the caller can surface it.
//!
//! Argument-vector calls run directly on Unix. On Windows they go through `cmd /C`, which
//! sidesteps argument-quoting differences between tools. The command line is handed to
//! `cmd` unescaped, with words quoted by [`quote_cmd`].

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// A command that ran and exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
  pub command: String,
  /// Exit code, or `None` if the process was killed by a signal.
  pub code: Option<i32>,
  /// Captured stdout followed by stderr.
  pub output: String,
}

impl fmt::Display for CommandError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.code {
      Some(code) => write!(f, "Command {} failed with code {}.", self.command, code)?,
      None => write!(f, "Command {} was terminated by a signal.", self.command)?,
    }
    let output = self.output.trim();
    if !output.is_empty() {
      write!(f, " {output}")?;
    }
    Ok(())
  }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Failed(#[from] CommandError),
}

/// Full replacement environment for a command. `None` inherits the current process env.
pub type Env = BTreeMap<String, String>;

/// Level command output is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Echo {
  Live,
  Quiet,
}

/// Run an argument vector, logging its output as it arrives.
pub async fn call<S: AsRef<OsStr>>(args: &[S], env: Option<&Env>, cwd: Option<&Path>) -> Result<(), ExecError> {
  run_argv(args, env, cwd, Echo::Live).await.map(|_| ())
}

/// Run an argument vector and return its trimmed stdout.
pub async fn call_capture<S: AsRef<OsStr>>(
  args: &[S],
  env: Option<&Env>,
  cwd: Option<&Path>,
) -> Result<String, ExecError> {
  let stdout = run_argv(args, env, cwd, Echo::Quiet).await?;
  Ok(stdout.trim().to_string())
}

async fn run_argv<S: AsRef<OsStr>>(
  args: &[S],
  env: Option<&Env>,
  cwd: Option<&Path>,
  echo: Echo,
) -> Result<String, ExecError> {
  let words: Vec<String> = args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect();
  let rendered = words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ");
  info!("+ {rendered}");

  if args.is_empty() {
    return Err(ExecError::Spawn {
      command: rendered,
      source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    });
  }

  let mut command = argv_command(args, &words);
  configure(&mut command, env, cwd);
  run(command, &rendered, echo).await
}

/// Run a command line through the platform shell (`sh -c` or `cmd /C`).
pub async fn shell(command_line: &str, env: Option<&Env>, cwd: Option<&Path>) -> Result<(), ExecError> {
  info!("+ {command_line}");

  let mut command = shell_command(command_line);
  configure(&mut command, env, cwd);

  run(command, command_line, Echo::Live).await.map(|_| ())
}

#[cfg(unix)]
fn argv_command<S: AsRef<OsStr>>(args: &[S], _words: &[String]) -> Command {
  let mut command = Command::new(args[0].as_ref());
  command.args(&args[1..]);
  command
}

#[cfg(windows)]
fn argv_command<S: AsRef<OsStr>>(_args: &[S], words: &[String]) -> Command {
  let line = words.iter().map(|w| quote_cmd(w)).collect::<Vec<_>>().join(" ");
  shell_command(&line)
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
  let mut command = Command::new("/bin/sh");
  command.arg("-c").arg(command_line);
  command
}

/// `/S` makes `cmd` strip exactly the outer pair of quotes and keep the rest verbatim.
#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
  let mut command = Command::new("cmd");
  command.raw_arg(format!("/S /C \"{command_line}\""));
  command
}

fn configure(command: &mut Command, env: Option<&Env>, cwd: Option<&Path>) {
  if let Some(env) = env {
    command.env_clear().envs(env);
  }
  if let Some(cwd) = cwd {
    command.current_dir(cwd);
  }
  command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
}

/// Wait for `command`, returning its stdout.
async fn run(mut command: Command, rendered: &str, echo: Echo) -> Result<String, ExecError> {
  let spawn_err = |source| ExecError::Spawn {
    command: rendered.to_string(),
    source,
  };
  let mut child = command.spawn().map_err(spawn_err)?;
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  let (stdout, stderr, status) = tokio::join!(collect(stdout, echo), collect(stderr, echo), child.wait());
  let status = status.map_err(spawn_err)?;

  if !status.success() {
    let mut captured = stdout;
    if !stderr.is_empty() {
      if !captured.is_empty() && !captured.ends_with('\n') {
        captured.push('\n');
      }
      captured.push_str(&stderr);
    }
    return Err(
      CommandError {
        command: rendered.to_string(),
        code: status.code(),
        output: captured,
      }
      .into(),
    );
  }

  Ok(stdout)
}

/// Read `stream` to the end, logging each line.
async fn collect<R: AsyncRead + Unpin>(stream: Option<R>, echo: Echo) -> String {
  let mut captured = String::new();
  let Some(stream) = stream else {
    return captured;
  };

  let mut reader = BufReader::new(stream);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    match reader.read_until(b'\n', &mut buf).await {
      Ok(0) | Err(_) => break,
      Ok(_) => {
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        match echo {
          Echo::Live => info!("{line}"),
          Echo::Quiet => debug!("{line}"),
        }
        captured.push_str(line);
        captured.push('\n');
      }
    }
  }
  captured
}

/// Quote a word for display the way a POSIX shell would need it.
pub fn quote(word: &str) -> String {
  if word.is_empty() {
    return "''".to_string();
  }
  let safe = word
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
  if safe {
    word.to_string()
  } else {
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
  }
}

/// Quote a word for a `cmd` command line. Words with spaces or `cmd` metacharacters are
/// wrapped in double quotes.
pub fn quote_cmd(word: &str) -> String {
  if word.is_empty() || word.contains([' ', '\t', '&', '(', ')', '<', '>', '^', '|']) {
    format!("\"{word}\"")
  } else {
    word.to_string()
  }
}

/// Directory holding `executable`, for prepending to `PATH`.
pub fn bin_dir(executable: &Path) -> &Path {
  executable.parent().unwrap_or(executable)
}
