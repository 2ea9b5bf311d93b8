//! End-to-end orchestrator runs against a stand-in interpreter and shell build commands.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use wheelwright_lib::build::{ArtifactError, BuildError, Orchestrator};
use wheelwright_lib::configs::BuildConfiguration;
use wheelwright_lib::install::{InstallError, Installer};
use wheelwright_lib::options::{CommandLineArguments, ConfigFile, Options};
use wheelwright_lib::platform::PlatformName;

/// Hands out a shell script standing in for a Python interpreter. Every invocation is
/// appended to `python.log` as `<interpreter> <args>`; `-m venv DIR` copies the script into
/// `DIR/bin/python`.
struct FakeInstaller {
  python: PathBuf,
  install_dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeInstaller {
  fn new(dir: &Path) -> Self {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python");
    let script = format!(
      "#!/bin/sh\n\
       echo \"$0 $*\" >> {log:?}\n\
       if [ \"$1\" = \"-m\" ] && [ \"$2\" = \"venv\" ]; then\n\
       \x20 mkdir -p \"$3/bin\" && cp \"$0\" \"$3/bin/python\"\n\
       fi\n\
       exit 0\n",
      log = dir.join("python.log").to_string_lossy()
    );
    std::fs::write(&python, script).unwrap();
    std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();
    FakeInstaller {
      python,
      install_dirs: Arc::default(),
    }
  }
}

impl Installer for FakeInstaller {
  async fn install(&self, _config: &BuildConfiguration, tmp: &Path) -> Result<PathBuf, InstallError> {
    assert!(tmp.is_dir());
    self.install_dirs.lock().unwrap().push(tmp.to_path_buf());
    Ok(self.python.clone())
  }
}

struct Project {
  temp: TempDir,
}

impl Project {
  fn new() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("package")).unwrap();
    std::fs::create_dir_all(temp.path().join("markers")).unwrap();
    Project { temp }
  }

  fn path(&self) -> &Path {
    self.temp.path()
  }

  fn marker(&self, name: &str) -> PathBuf {
    self.path().join("markers").join(name)
  }

  fn wheelhouse(&self) -> PathBuf {
    self.path().join("wheelhouse")
  }

  fn wheels(&self) -> Vec<String> {
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

  /// Options with `MARKERS` pointing at the marker directory. `extra` is placed in the
  /// `[linux]` table, so it overrides the base commands.
  fn options(&self, extra: &str) -> Options {
    let contents = format!(
      "build-command = \"touch {{dest_dir}}/spam-0.1-$TAG-$TAG-linux_x86_64.whl\"\n\
       repair-command = \"\"\n\
       environment = {{ MARKERS = {:?} }}\n\
       [linux]\n{extra}\n\
       [[overrides]]\nselect = \"cp38-*\"\nenvironment = {{ TAG = \"cp38\" }}\n\
       [[overrides]]\nselect = \"cp39-*\"\nenvironment = {{ TAG = \"cp39\" }}\n\
       [[overrides]]\nselect = \"cp310-*\"\nenvironment = {{ TAG = \"cp310\" }}\n",
      self.path().join("markers").to_string_lossy()
    );
    let file = ConfigFile::parse(&contents, Path::new("wheelwright.toml")).unwrap();
    let mut args = CommandLineArguments::new(PlatformName::Linux, self.path().join("package"));
    args.archs = Some("x86_64".to_string());
    args.output_dir = Some(self.wheelhouse());
    Options::new(&args, file).unwrap()
  }

  fn orchestrator<'a>(&self, options: &'a Options) -> Orchestrator<'a, FakeInstaller> {
    self.orchestrator_with(options, FakeInstaller::new(self.path()))
  }

  fn orchestrator_with<'a>(&self, options: &'a Options, installer: FakeInstaller) -> Orchestrator<'a, FakeInstaller> {
    let env = BTreeMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]);
    Orchestrator::new(options, installer).with_env(env)
  }

  fn python(&self) -> PathBuf {
    self.path().join("bin").join("python")
  }

  /// Interpreter invocations recorded by the stand-in Python, as `(interpreter, args)`.
  fn python_calls(&self) -> Vec<(String, String)> {
    std::fs::read_to_string(self.path().join("python.log"))
      .unwrap_or_default()
      .lines()
      .map(|line| {
        let (interpreter, args) = line.split_once(' ').unwrap_or((line, ""));
        (interpreter.to_string(), args.to_string())
      })
      .collect()
  }
}

fn plan(identifiers: &[&str]) -> Vec<BuildConfiguration> {
  identifiers
    .iter()
    .map(|identifier| BuildConfiguration {
      version: "3.9".to_string(),
      arch: "x86_64".to_string(),
      identifier: identifier.to_string(),
      url: None,
      path: Some(PathBuf::from("/opt/python/unused")),
    })
    .collect()
}

#[tokio::test]
async fn builds_every_configuration_in_order() {
  let project = Project::new();
  let options = project.options("before-all = \"echo ran >> $MARKERS/before_all\"");

  let summary = project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64", "cp39-manylinux_x86_64"]))
    .await
    .unwrap();

  let identifiers: Vec<&str> = summary.wheels.iter().map(|w| w.identifier.as_str()).collect();
  assert_eq!(identifiers, ["cp38-manylinux_x86_64", "cp39-manylinux_x86_64"]);
  assert_eq!(
    project.wheels(),
    [
      "spam-0.1-cp38-cp38-linux_x86_64.whl",
      "spam-0.1-cp39-cp39-linux_x86_64.whl"
    ]
  );
  let before_all = std::fs::read_to_string(project.marker("before_all")).unwrap();
  assert_eq!(before_all.lines().count(), 1);
}

#[tokio::test]
async fn stops_at_first_failing_configuration() {
  let project = Project::new();
  let options = project.options(
    "before-build = \"touch $MARKERS/before-$TAG\"\n\
     [[overrides]]\nselect = \"cp39-*\"\nbuild-command = \"echo boom >&2; exit 7\"",
  );

  let err = project
    .orchestrator(&options)
    .run(&plan(&[
      "cp38-manylinux_x86_64",
      "cp39-manylinux_x86_64",
      "cp310-manylinux_x86_64",
    ]))
    .await
    .unwrap_err();

  let failure = err.command().expect("command failure");
  assert_eq!(failure.code, Some(7));
  assert!(failure.output.contains("boom"));
  assert_eq!(project.wheels(), ["spam-0.1-cp38-cp38-linux_x86_64.whl"]);
  assert!(project.marker("before-cp39").exists());
  assert!(!project.marker("before-cp310").exists());
}

#[tokio::test]
async fn repair_and_test_follow_selectors() {
  let project = Project::new();
  let options = project.options(
    "repair-command = \"cp {wheel} {dest_dir}/ && touch $MARKERS/repaired-$TAG\"\n\
     test-command = \"touch $MARKERS/tested-$TAG\"\n\
     test-skip = \"cp39-*\"",
  );

  project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64", "cp39-manylinux_x86_64"]))
    .await
    .unwrap();

  assert_eq!(project.wheels().len(), 2);
  assert!(project.marker("repaired-cp38").exists());
  assert!(project.marker("repaired-cp39").exists());
  assert!(project.marker("tested-cp38").exists());
  assert!(!project.marker("tested-cp39").exists());
}

#[tokio::test]
async fn pure_python_wheel_is_rejected() {
  let project = Project::new();
  let options = project.options("build-command = \"touch {dest_dir}/spam-0.1-py3-none-any.whl\"");

  let err = project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::Artifact(ArtifactError::PurePython(_))));
  assert!(err.to_string().contains("pure Python wheel"));
  assert!(project.wheels().is_empty());
}

#[tokio::test]
async fn build_without_wheel_is_missing_artifact() {
  let project = Project::new();
  let options = project.options("build-command = \"true\"");

  let err = project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::Artifact(ArtifactError::Missing(_))));
}

#[tokio::test]
async fn existing_output_is_replaced() {
  let project = Project::new();
  std::fs::create_dir_all(project.wheelhouse()).unwrap();
  let stale = project.wheelhouse().join("spam-0.1-cp38-cp38-linux_x86_64.whl");
  std::fs::write(&stale, b"stale").unwrap();
  let options = project.options("");

  project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap();

  assert_eq!(std::fs::read(&stale).unwrap(), b"");
}

#[tokio::test]
async fn empty_plan_does_nothing() {
  let project = Project::new();
  let options = project.options("before-all = \"touch $MARKERS/before_all\"");

  let summary = project.orchestrator(&options).run(&[]).await.unwrap();

  assert!(summary.wheels.is_empty());
  assert!(!project.marker("before_all").exists());
}

#[tokio::test]
async fn environment_values_see_earlier_keys() {
  let project = Project::new();
  let options = project.options(
    "environment = { ZLIB = \"/opt/z\", CFLAGS = \"-I$ZLIB/include\" }\n\
     before-build = \"echo $CFLAGS > $MARKERS/cflags\"",
  );

  project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap();

  let cflags = std::fs::read_to_string(project.marker("cflags")).unwrap();
  assert_eq!(cflags.trim(), "-I/opt/z/include");
}

#[tokio::test]
async fn tests_run_in_a_separate_environment() {
  let project = Project::new();
  let options = project.options(
    "test-requires = \"pytest\"\n\
     test-command = \"python -c 'import spam'\"",
  );

  project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap();

  let build_python = project.python().to_string_lossy().into_owned();
  let calls = project.python_calls();
  let venv = calls
    .iter()
    .find(|(interpreter, args)| *interpreter == build_python && args.starts_with("-m venv "))
    .map(|(_, args)| args.trim_start_matches("-m venv ").to_string())
    .expect("venv created from the build interpreter");
  let venv_python = format!("{venv}/bin/python");

  let installs: Vec<&(String, String)> = calls
    .iter()
    .filter(|(_, args)| args.starts_with("-m pip install"))
    .collect();
  assert_eq!(installs.len(), 2);
  assert!(installs.iter().all(|(interpreter, _)| *interpreter == venv_python));
  assert!(installs[1].1.ends_with("install pytest"));
  assert!(
    calls
      .iter()
      .any(|(interpreter, args)| *interpreter == venv_python && args == "-c import spam")
  );
  assert!(!Path::new(&venv).exists());
}

#[tokio::test]
async fn pinned_constraints_are_exported() {
  let project = Project::new();
  let options = project.options("before-build = \"cat \\\"$PIP_CONSTRAINT\\\" > $MARKERS/pins\"");

  project
    .orchestrator(&options)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap();

  let pins = std::fs::read_to_string(project.marker("pins")).unwrap();
  assert!(pins.contains("pip=="));
}

#[tokio::test]
async fn scratch_directories_are_removed_after_a_failure() {
  let project = Project::new();
  let options = project.options("build-command = \"touch {dest_dir}/partial.o; exit 2\"");
  let installer = FakeInstaller::new(project.path());
  let install_dirs = Arc::clone(&installer.install_dirs);

  let err = project
    .orchestrator_with(&options, installer)
    .run(&plan(&["cp38-manylinux_x86_64"]))
    .await
    .unwrap_err();

  assert_eq!(err.command().map(|failure| failure.code), Some(Some(2)));
  let install_dirs = install_dirs.lock().unwrap();
  assert_eq!(install_dirs.len(), 1);
  let install_dir = &install_dirs[0];
  assert!(!install_dir.exists());
  let run_dir = install_dir.parent().unwrap();
  assert!(!run_dir.exists(), "run directory {} left behind", run_dir.display());
}
