//! Shared test helpers for CLI integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated project: a package directory, a stand-in interpreter, a private cache, and a
/// platform table whose rows point at the interpreter.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new(identifiers: &[&str]) -> Self {
    let temp = TempDir::new().unwrap();
    let env = TestEnv { temp };

    let prefix = env.path().join("python");
    let bin = prefix.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python");
    std::fs::write(&python, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

    let rows: Vec<String> = identifiers
      .iter()
      .map(|identifier| {
        format!(
          "  {{ identifier = \"{identifier}\", version = \"3.9\", arch = \"x86_64\", path = {:?} }},",
          prefix.to_string_lossy()
        )
      })
      .collect();
    env.write_file(
      "build-platforms.toml",
      &format!("[linux]\npython_configurations = [\n{}\n]\n", rows.join("\n")),
    );
    std::fs::create_dir_all(env.package_dir()).unwrap();
    env
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn package_dir(&self) -> PathBuf {
    self.path().join("package")
  }

  pub fn wheelhouse(&self) -> PathBuf {
    self.path().join("wheelhouse")
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Write the package's `wheelwright.toml`.
  pub fn config(&self, content: &str) {
    self.write_file("package/wheelwright.toml", content);
  }

  pub fn wheels(&self) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(self.wheelhouse())
      .map(|entries| {
        entries
          .filter_map(|e| e.ok())
          .map(|e| e.file_name().to_string_lossy().into_owned())
          .collect()
      })
      .unwrap_or_default();
    names.sort();
    names
  }

  /// `wheelwright build` against this environment's table, cache and output directory.
  pub fn build_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("wheelwright");
    cmd
      .env("WHEELWRIGHT_CACHE_PATH", self.path().join("cache"))
      .env("RUST_LOG", "info")
      .arg("build")
      .arg(self.package_dir())
      .args(["--platform", "linux", "--archs", "x86_64"])
      .arg("--platform-table")
      .arg(self.path().join("build-platforms.toml"))
      .arg("--output-dir")
      .arg(self.wheelhouse());
    cmd
  }
}
