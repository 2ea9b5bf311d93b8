//! How the commands talk to the terminal.
//!
//! Progress and results go to stdout as status lines, failures go to stderr. With
//! `--output json` the commands print one JSON document instead.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Kind of status line.
#[derive(Debug, Clone, Copy)]
pub enum Status {
  Note,
  Done,
  Failed,
}

impl Status {
  fn mark(self) -> &'static str {
    match self {
      Status::Note => "•",
      Status::Done => "✓",
      Status::Failed => "✗",
    }
  }
}

pub fn status(kind: Status, message: &str) {
  let mark = kind.mark();
  match kind {
    Status::Note => println!("{} {message}", mark.if_supports_color(Stream::Stdout, |s| s.blue())),
    Status::Done => println!("{} {message}", mark.if_supports_color(Stream::Stdout, |s| s.green())),
    Status::Failed => eprintln!(
      "{} {}",
      mark.if_supports_color(Stream::Stderr, |s| s.red()),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
  }
}

/// An indented `label: value` line, used under a status line.
pub fn detail(label: &str, value: &str) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let text = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{text}");
  Ok(())
}

/// Wheel size in binary units, one decimal past bytes.
pub fn human_size(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

/// Wall time of a run: seconds with one decimal under a minute, then minutes and seconds.
pub fn elapsed(duration: Duration) -> String {
  let secs = duration.as_secs();
  if secs < 60 {
    format!("{:.1}s", duration.as_secs_f64())
  } else {
    format!("{}m {:02}s", secs / 60, secs % 60)
  }
}
