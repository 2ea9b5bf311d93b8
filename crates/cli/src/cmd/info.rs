use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use wheelwright_lib::platform::PlatformName;
use wheelwright_lib::platform::arch::Architecture;
use wheelwright_lib::platform::paths;

use crate::output::{OutputFormat, detail, json};

#[derive(Serialize)]
struct Info {
  version: &'static str,
  platform: Option<PlatformName>,
  native_arch: Option<Architecture>,
  cache_dir: Option<String>,
}

pub fn cmd_info(output: OutputFormat) -> Result<ExitCode> {
  let platform = PlatformName::current();
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform,
    native_arch: platform.and_then(|p| Architecture::native(p).ok()),
    cache_dir: paths::cache_dir().map(|p| p.display().to_string()),
  };

  if output.is_json() {
    json(&info)?;
    return Ok(ExitCode::SUCCESS);
  }

  let unknown = || "unknown".to_string();
  println!("wheelwright {}", info.version);
  detail("Platform", &info.platform.map(|p| p.to_string()).unwrap_or_else(unknown));
  detail("Native arch", &info.native_arch.map(|a| a.to_string()).unwrap_or_else(unknown));
  detail("Cache", &info.cache_dir.unwrap_or_else(unknown));
  Ok(ExitCode::SUCCESS)
}
