//! Archive unpacking for downloaded runtimes.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use super::CacheError;
use crate::exec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  Zip,
  TarGz,
  TarBz2,
}

impl ArchiveKind {
  const SUFFIXES: [(&'static str, ArchiveKind); 4] = [
    (".zip", ArchiveKind::Zip),
    (".tar.gz", ArchiveKind::TarGz),
    (".tgz", ArchiveKind::TarGz),
    (".tar.bz2", ArchiveKind::TarBz2),
  ];

  pub fn detect(name: &str) -> Option<ArchiveKind> {
    Self::SUFFIXES
      .iter()
      .find(|(suffix, _)| name.ends_with(suffix))
      .map(|(_, kind)| *kind)
  }
}

/// File name of an archive with its archive suffix removed.
///
/// `pypy3.8-v7.3.9-win64.zip` → `pypy3.8-v7.3.9-win64`.
pub fn archive_stem(name: &str) -> Option<&str> {
  ArchiveKind::SUFFIXES
    .iter()
    .find_map(|(suffix, _)| name.strip_suffix(suffix))
    .filter(|stem| !stem.is_empty())
}

/// Unpack `archive` into the directory `dest`, creating it.
pub async fn unpack(archive: &Path, dest: &Path) -> Result<(), CacheError> {
  let name = archive.file_name().unwrap_or_default().to_string_lossy();
  let kind = ArchiveKind::detect(&name).ok_or_else(|| CacheError::UnsupportedArchive(archive.to_path_buf()))?;

  info!("+ Extract {} to {}", archive.display(), dest.display());
  tokio::fs::create_dir_all(dest).await.map_err(|source| CacheError::Io {
    path: dest.to_path_buf(),
    source,
  })?;

  match kind {
    ArchiveKind::TarBz2 => {
      let args = [
        "tar".into(),
        "-C".into(),
        dest.as_os_str().to_owned(),
        "-xf".into(),
        archive.as_os_str().to_owned(),
      ];
      exec::call(&args, None, None).await?;
      Ok(())
    }
    ArchiveKind::Zip | ArchiveKind::TarGz => {
      let archive = archive.to_path_buf();
      let dest = dest.to_path_buf();
      let join_path = archive.clone();
      tokio::task::spawn_blocking(move || unpack_blocking(kind, &archive, &dest))
        .await
        .map_err(|e| CacheError::Archive {
          path: join_path,
          message: e.to_string(),
        })?
    }
  }
}

/// If `dir` holds exactly one directory and nothing else, move that directory's contents up
/// so `dir` takes its place. Runtime archives usually wrap everything in a top-level folder.
pub async fn hoist_single_dir(dir: &Path) -> Result<(), CacheError> {
  let io_error = |path: &Path, source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  };

  let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_error(dir, e))?;
  let mut names = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
    names.push(entry);
    if names.len() > 1 {
      return Ok(());
    }
  }
  let Some(only) = names.pop() else {
    return Ok(());
  };
  let is_dir = only.file_type().await.map_err(|e| io_error(&only.path(), e))?.is_dir();
  if !is_dir {
    return Ok(());
  }

  let mut parked_name = dir.file_name().unwrap_or_default().to_os_string();
  parked_name.push(".unpack");
  let parked = dir.with_file_name(parked_name);
  tokio::fs::rename(dir, &parked).await.map_err(|e| io_error(dir, e))?;
  let inner = parked.join(only.file_name());
  tokio::fs::rename(&inner, dir).await.map_err(|e| io_error(&inner, e))?;
  tokio::fs::remove_dir(&parked).await.map_err(|e| io_error(&parked, e))?;
  Ok(())
}

fn unpack_blocking(kind: ArchiveKind, archive: &Path, dest: &Path) -> Result<(), CacheError> {
  let archive_error = |message: String| CacheError::Archive {
    path: archive.to_path_buf(),
    message,
  };
  let file = File::open(archive).map_err(|source| CacheError::Io {
    path: archive.to_path_buf(),
    source,
  })?;

  match kind {
    ArchiveKind::Zip => {
      let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;
      zip.extract(dest).map_err(|e| archive_error(e.to_string()))
    }
    ArchiveKind::TarGz => {
      let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
      tar.unpack(dest).map_err(|e| archive_error(e.to_string()))
    }
    ArchiveKind::TarBz2 => Err(CacheError::UnsupportedArchive(PathBuf::from(archive))),
  }
}
