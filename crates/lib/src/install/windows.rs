use std::ffi::OsString;
use std::path::PathBuf;

use super::InstallError;
use crate::cache::CacheRoot;
use crate::exec;

const NUGET_URL: &str = "https://dist.nuget.org/win-x86-commandline/latest/nuget.exe";
const NUGET_FEED: &str = "https://api.nuget.org/v3/index.json";

/// NuGet package name for an architecture tag of the Windows table.
pub(super) fn package_name(identifier: &str, arch: &str) -> Result<&'static str, InstallError> {
  match arch {
    "32" => Ok("pythonx86"),
    "64" => Ok("python"),
    "ARM64" => Ok("pythonarm64"),
    other => Err(InstallError::UnsupportedArch {
      identifier: identifier.to_string(),
      arch: other.to_string(),
    }),
  }
}

pub(super) async fn install_cpython(
  cache: &CacheRoot,
  identifier: &str,
  version: &str,
  arch: &str,
) -> Result<PathBuf, InstallError> {
  let package = package_name(identifier, arch)?;
  let nuget = cache.ensure_download("nuget.exe", NUGET_URL).await?;

  let key = format!("nuget-cpython/{version}-{arch}");
  let root = cache
    .ensure::<_, _, InstallError>(&key, |staging| async move {
      let args: Vec<OsString> = vec![
        nuget.into_os_string(),
        "install".into(),
        package.into(),
        "-Version".into(),
        version.into(),
        "-FallbackSource".into(),
        NUGET_FEED.into(),
        "-OutputDirectory".into(),
        staging.into_os_string(),
      ];
      exec::call(&args, None, None).await?;
      Ok(())
    })
    .await?;

  Ok(root.join(format!("{package}.{version}")).join("tools").join("python.exe"))
}
