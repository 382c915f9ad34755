//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding a targets directory and
/// the parent of all install roots.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create with the given fixtures copied into the targets directory.
  pub fn with_fixtures(names: &[&str]) -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    for name in names {
      std::fs::write(env.targets_path().join(name), fixture_content(name)).unwrap();
    }
    env
  }

  /// Directory searched for target definitions.
  pub fn targets_path(&self) -> PathBuf {
    let p = self.temp.path().join("targets");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Parent of default install roots.
  pub fn root_path(&self) -> PathBuf {
    let p = self.temp.path().join("installs");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Install root of a target built with the default root.
  pub fn install_root(&self, target: &str) -> PathBuf {
    self.root_path().join(target)
  }

  /// Get a pre-configured Command for the omnirig binary.
  ///
  /// Sets `OMNIRIG_TARGETS` and `OMNIRIG_ROOT` to the isolated directories.
  pub fn omnirig(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("omnirig");
    cmd.env("OMNIRIG_TARGETS", self.targets_path());
    cmd.env("OMNIRIG_ROOT", self.root_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
