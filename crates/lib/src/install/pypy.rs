use std::path::{Path, PathBuf};

use super::InstallError;
use crate::cache::archive::{archive_stem, hoist_single_dir, unpack};
use crate::cache::fetch::{download, url_file_name};
use crate::cache::{CacheError, CacheRoot};

/// Download and unpack a PyPy release into the cache, keyed by the archive name without
/// its suffix.
pub(super) async fn install(
  cache: &CacheRoot,
  tmp: &Path,
  url: &str,
  executable: &Path,
) -> Result<PathBuf, InstallError> {
  let unsupported = || CacheError::UnsupportedArchive(PathBuf::from(url));
  let filename = url_file_name(url).ok_or_else(unsupported)?;
  let stem = archive_stem(filename).ok_or_else(unsupported)?;
  let downloaded = tmp.join(filename);

  let root = cache
    .ensure::<_, _, InstallError>(stem, |staging| async move {
      download(url, &downloaded).await?;
      unpack(&downloaded, &staging).await?;
      hoist_single_dir(&staging).await?;
      let _ = tokio::fs::remove_file(&downloaded).await;
      Ok(())
    })
    .await?;

  Ok(root.join(executable))
}
