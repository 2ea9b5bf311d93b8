//! CLI smoke tests for wheelwright.
//!
//! These run the binary for plan resolution and argument handling only; nothing is built.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn wheelwright_cmd() -> Command {
  cargo_bin_cmd!("wheelwright")
}

/// A package directory holding `wheelwright.toml` with `content`.
fn temp_package(content: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("wheelwright.toml"), content).unwrap();
  temp
}

fn identifiers_cmd(package: &TempDir) -> Command {
  let mut cmd = wheelwright_cmd();
  cmd
    .arg("build")
    .arg(package.path())
    .args(["--platform", "linux", "--archs", "x86_64", "--print-build-identifiers"]);
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  wheelwright_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  wheelwright_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("wheelwright"));
}

#[test]
fn build_help_lists_flags() {
  wheelwright_cmd()
    .args(["build", "--help"])
    .assert()
    .success()
    .stdout(predicate::str::contains("--print-build-identifiers"))
    .stdout(predicate::str::contains("--allow-empty"));
}

#[test]
fn info_runs() {
  wheelwright_cmd()
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains("Cache"));
}

#[test]
fn unknown_command_fails() {
  wheelwright_cmd().arg("frobnicate").assert().failure().code(2);
}

// =============================================================================
// Build identifiers
// =============================================================================

#[test]
fn prints_selected_identifiers_in_table_order() {
  let package = temp_package("build = \"cp3{8,9}-*\"\nskip = \"*-musllinux_*\"\n");

  identifiers_cmd(&package)
    .assert()
    .success()
    .stdout("cp38-manylinux_x86_64\ncp39-manylinux_x86_64\n");
}

#[test]
fn prints_identifiers_as_json() {
  let package = temp_package("build = \"cp310-manylinux_*\"\n");

  identifiers_cmd(&package)
    .args(["--output", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"platform\": \"linux\""))
    .stdout(predicate::str::contains("cp310-manylinux_x86_64"));
}

#[test]
fn explicit_config_file_is_used() {
  let package = TempDir::new().unwrap();
  let config = package.path().join("custom.toml");
  std::fs::write(&config, "build = \"pp38-*\"\n").unwrap();

  identifiers_cmd(&package)
    .arg("--config-file")
    .arg(&config)
    .assert()
    .success()
    .stdout("pp38-manylinux_x86_64\n");
}

#[test]
fn prerelease_needs_opt_in() {
  let package = temp_package("build = \"cp311-manylinux_*\"\n");
  identifiers_cmd(&package).assert().success().stdout("");

  let package = temp_package("build = \"cp311-manylinux_*\"\nprerelease-pythons = true\n");
  identifiers_cmd(&package)
    .assert()
    .success()
    .stdout("cp311-manylinux_x86_64\n");
}

// =============================================================================
// Exit codes
// =============================================================================

#[test]
fn empty_plan_exits_with_3() {
  let package = temp_package("build = \"cp99-*\"\n");

  wheelwright_cmd()
    .arg("build")
    .arg(package.path())
    .args(["--platform", "linux", "--archs", "x86_64"])
    .assert()
    .code(3)
    .stderr(predicate::str::contains("No build identifiers selected"));
}

#[test]
fn empty_plan_allowed() {
  let package = temp_package("build = \"cp99-*\"\n");

  wheelwright_cmd()
    .arg("build")
    .arg(package.path())
    .args(["--platform", "linux", "--archs", "x86_64", "--allow-empty"])
    .assert()
    .success();
}

#[test]
fn unknown_option_exits_with_2() {
  let package = temp_package("bulid = \"*\"\n");

  identifiers_cmd(&package)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("bulid"));
}

#[test]
fn bad_archs_exits_with_2() {
  let package = temp_package("");

  wheelwright_cmd()
    .arg("build")
    .arg(package.path())
    .args(["--platform", "linux", "--archs", "AMD64", "--print-build-identifiers"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("AMD64"));
}

#[test]
fn bad_platform_exits_with_2() {
  let package = temp_package("");

  wheelwright_cmd()
    .arg("build")
    .arg(package.path())
    .args(["--platform", "beos"])
    .assert()
    .code(2);
}
