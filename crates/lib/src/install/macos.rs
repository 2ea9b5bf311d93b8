use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::InstallError;
use crate::cache::CacheRoot;
use crate::cache::fetch::download;
use crate::exec;

const CI_VARIABLES: &[&str] = &[
  "CI",
  "GITHUB_ACTIONS",
  "TRAVIS",
  "APPVEYOR",
  "CIRCLECI",
  "GITLAB_CI",
  "AZURE_HTTP_USER_AGENT",
  "BITRISE_BUILD_NUMBER",
  "CIRRUS_CI",
];

/// True when running on a CI service, where system-wide installs are acceptable.
pub fn detect_ci() -> bool {
  CI_VARIABLES
    .iter()
    .any(|name| std::env::var_os(name).is_some_and(|v| !v.is_empty()))
}

/// Install the python.org framework build of `version` unless it is already present.
///
/// Outside CI this refuses to run `sudo installer` and returns an actionable error instead.
pub(super) async fn install_cpython(
  cache: &CacheRoot,
  tmp: &Path,
  version: &str,
  url: &str,
) -> Result<PathBuf, InstallError> {
  let installation = PathBuf::from(format!("/Library/Frameworks/Python.framework/Versions/{version}"));
  let _lock = cache.lock(&format!("cpython{version}")).await?;

  let packages = exec::call_capture(&["pkgutil", "--pkgs"], None, None).await?;
  let package_id = format!("org.python.Python.PythonFramework-{version}");
  if packages.lines().any(|line| line.trim() == package_id) {
    debug!(version, "CPython framework already installed");
    return Ok(installation.join("bin").join("python3"));
  }

  if !detect_ci() {
    return Err(InstallError::LocalSystemInstall {
      version: version.to_string(),
      skip: format!("cp{}-macosx_*", version.replace('.', "")),
      url: url.to_string(),
    });
  }

  let pkg = tmp.join("Python.pkg");
  download(url, &pkg).await?;
  let args = [
    OsStr::new("sudo"),
    OsStr::new("installer"),
    OsStr::new("-pkg"),
    pkg.as_os_str(),
    OsStr::new("-target"),
    OsStr::new("/"),
  ];
  exec::call(&args, None, None).await?;
  let _ = tokio::fs::remove_file(&pkg).await;

  Ok(installation.join("bin").join("python3"))
}
