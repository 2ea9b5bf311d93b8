//! Crate-wide constants.

/// Application name, used for cache directories and lock metadata.
pub const APP_NAME: &str = "wheelwright";

/// Environment variable overriding the toolchain cache root.
pub const CACHE_PATH_ENV: &str = "WHEELWRIGHT_CACHE_PATH";

/// Attempts made by `download` before giving up.
pub const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Seconds slept between download attempts.
pub const DOWNLOAD_RETRY_DELAY_SECS: u64 = 3;

/// Identifiers of interpreters still in prerelease. Skipped unless prereleases are enabled.
pub const PRERELEASE_SKIP: &str = "cp311-*";

/// Patch number used when turning an identifier's version family into a concrete version,
/// so `>=3.8` admits every 3.8.x.
pub const SYNTHETIC_PATCH: u64 = 99;
