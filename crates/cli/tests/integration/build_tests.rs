//! `wheelwright build` runs end to end.

use predicates::prelude::*;

use super::common::TestEnv;

const BASE_CONFIG: &str = r#"
build-command = "touch {dest_dir}/spam-0.1-$TAG-$TAG-linux_x86_64.whl"
repair-command = ""

[[overrides]]
select = "cp38-*"
environment = { TAG = "cp38" }

[[overrides]]
select = "cp39-*"
environment = { TAG = "cp39" }
"#;

#[test]
fn builds_and_reports_wheels() {
  let env = TestEnv::new(&["cp38-manylinux_x86_64", "cp39-manylinux_x86_64"]);
  env.config(BASE_CONFIG);

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("2 wheel(s) produced"))
    .stdout(predicate::str::contains("spam-0.1-cp38-cp38-linux_x86_64.whl"));

  assert_eq!(
    env.wheels(),
    [
      "spam-0.1-cp38-cp38-linux_x86_64.whl",
      "spam-0.1-cp39-cp39-linux_x86_64.whl"
    ]
  );
}

#[test]
fn commands_are_echoed() {
  let env = TestEnv::new(&["cp38-manylinux_x86_64"]);
  env.config(BASE_CONFIG);

  env
    .build_cmd()
    .assert()
    .success()
    .stderr(predicate::str::contains("+ touch"));
}

#[test]
fn failing_command_exits_with_1_and_stops() {
  let env = TestEnv::new(&["cp38-manylinux_x86_64", "cp39-manylinux_x86_64"]);
  env.config(&format!(
    "{BASE_CONFIG}\n[[overrides]]\nselect = \"cp38-*\"\nbuild-command = \"echo compiler exploded >&2; exit 4\"\n"
  ));

  env
    .build_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("failed with code 4"))
    .stderr(predicate::str::contains("compiler exploded"));

  assert!(env.wheels().is_empty());
}

#[test]
fn pure_python_wheel_exits_with_1() {
  let env = TestEnv::new(&["cp38-manylinux_x86_64"]);
  env.config("build-command = \"touch {dest_dir}/spam-0.1-py3-none-any.whl\"\nrepair-command = \"\"\n");

  env
    .build_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("pure Python wheel"));
}

#[test]
fn missing_interpreter_exits_with_1() {
  let env = TestEnv::new(&["cp38-manylinux_x86_64"]);
  env.config(BASE_CONFIG);
  std::fs::remove_file(env.path().join("python").join("bin").join("python")).unwrap();

  env
    .build_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no interpreter"));
}

#[test]
fn json_summary() {
  let env = TestEnv::new(&["cp39-manylinux_x86_64"]);
  env.config(BASE_CONFIG);

  env
    .build_cmd()
    .args(["--output", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"identifier\": \"cp39-manylinux_x86_64\""));
}
