//! URL downloads with retry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::CacheError;
use crate::consts::{DOWNLOAD_ATTEMPTS, DOWNLOAD_RETRY_DELAY_SECS};

/// Download `url` to `dest`.
///
/// Tries [`DOWNLOAD_ATTEMPTS`] times with a fixed pause between attempts. Every failure is
/// retried; the last one is returned. The body is written to a temporary sibling and renamed
/// onto `dest`.
pub async fn download(url: &str, dest: &Path) -> Result<(), CacheError> {
  info!("+ Download {url} to {}", dest.display());
  retry(
    DOWNLOAD_ATTEMPTS,
    Duration::from_secs(DOWNLOAD_RETRY_DELAY_SECS),
    || download_once(url, dest),
  )
  .await
}

async fn download_once(url: &str, dest: &Path) -> Result<(), CacheError> {
  let response = reqwest::get(url).await.map_err(|e| CacheError::Download {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  if !response.status().is_success() {
    return Err(CacheError::Download {
      url: url.to_string(),
      message: format!("HTTP {}", response.status()),
    });
  }

  let bytes = response.bytes().await.map_err(|e| CacheError::Download {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  let partial = partial_path(dest);
  let write = async {
    let mut file = fs::File::create(&partial).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    fs::rename(&partial, dest).await
  };
  if let Err(source) = write.await {
    let _ = fs::remove_file(&partial).await;
    return Err(CacheError::Io {
      path: dest.to_path_buf(),
      source,
    });
  }

  info!(path = %dest.display(), size = bytes.len(), "download complete");
  Ok(())
}

/// Run `op` up to `attempts` times, sleeping `delay` between failures.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) if attempt >= attempts => return Err(err),
      Err(err) => {
        warn!(attempt, error = %err, "attempt failed, retrying");
        attempt += 1;
        tokio::time::sleep(delay).await;
      }
    }
  }
}

fn partial_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().unwrap_or_default().to_os_string();
  name.push(".download");
  dest.with_file_name(name)
}

/// The file name a URL points at: its last path segment without query or fragment.
pub fn url_file_name(url: &str) -> Option<&str> {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  let name = path.rsplit('/').next()?;
  (!name.is_empty() && name != "." && name != "..").then_some(name)
}
