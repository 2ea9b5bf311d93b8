use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_PATH_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the platform's per-user cache directory for the application
#[cfg(windows)]
pub fn user_cache_dir() -> Option<PathBuf> {
  std::env::var_os("LOCALAPPDATA").map(|local| PathBuf::from(local).join(APP_NAME).join("Cache"))
}

/// Returns the platform's per-user cache directory for the application
#[cfg(target_os = "macos")]
pub fn user_cache_dir() -> Option<PathBuf> {
  home_dir().map(|home| home.join("Library").join("Caches").join(APP_NAME))
}

/// Returns the platform's per-user cache directory for the application
#[cfg(all(not(windows), not(target_os = "macos")))]
pub fn user_cache_dir() -> Option<PathBuf> {
  std::env::var_os("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".cache")))
    .map(|cache| cache.join(APP_NAME))
}

/// Returns the toolchain cache directory: the `WHEELWRIGHT_CACHE_PATH` override if set,
/// otherwise the user cache directory.
pub fn cache_dir() -> Option<PathBuf> {
  std::env::var_os(CACHE_PATH_ENV)
    .filter(|value| !value.is_empty())
    .map(PathBuf::from)
    .or_else(user_cache_dir)
}

#[cfg(test)]
#[cfg(all(not(windows), not(target_os = "macos")))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn cache_override_takes_precedence() {
    temp_env::with_vars(
      [
        (CACHE_PATH_ENV, Some("/custom/cache")),
        ("XDG_CACHE_HOME", Some("/xdg/cache")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/custom/cache")));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_cache_home_used_without_override() {
    temp_env::with_vars(
      [(CACHE_PATH_ENV, None::<&str>), ("XDG_CACHE_HOME", Some("/xdg/cache"))],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/xdg/cache").join(APP_NAME)));
      },
    );
  }

  #[test]
  #[serial]
  fn falls_back_to_home_cache() {
    temp_env::with_vars(
      [
        (CACHE_PATH_ENV, None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/home/user/.cache").join(APP_NAME)));
      },
    );
  }
}
