//! Tests for `omnirig verify` and `omnirig run`.

use predicates::prelude::*;

use super::common::TestEnv;

fn built_hello() -> TestEnv {
  let env = TestEnv::with_fixtures(&["hello.toml", "failing.toml"]);
  env.omnirig().args(["build", "hello"]).assert().success();
  env
}

#[test]
fn verify_passes_after_build() {
  let env = built_hello();
  let root = env.install_root("hello");

  env
    .omnirig()
    .arg("verify")
    .arg("hello")
    .arg(&root)
    .assert()
    .success()
    .stdout(predicate::str::contains("4 passed, 0 failed"));
}

#[test]
fn wrong_version_fails_with_diagnostics() {
  let env = built_hello();
  let root = env.install_root("hello");

  env
    .omnirig()
    .arg("verify")
    .arg("hello")
    .arg(&root)
    .args(["--expect-version", "9.9.9"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("FAIL [2/4] hello: greeting names the version"))
    .stderr(predicate::str::contains("actual:   hello 1.2.3"))
    .stderr(predicate::str::contains("--- build log"));
}

#[test]
fn verify_of_empty_root_reports_every_failure() {
  let env = TestEnv::with_fixtures(&["hello.toml"]);
  let empty = env.temp.path().join("empty");
  std::fs::create_dir_all(&empty).unwrap();

  let output = env
    .omnirig()
    .args(["--output", "json", "verify", "hello"])
    .arg(&empty)
    .output()
    .unwrap();

  assert_eq!(output.status.code(), Some(1));
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let statuses: Vec<_> = report["records"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["outcome"]["status"].as_str().unwrap().to_string())
    .collect();
  // The command-output assertion does not depend on the install.
  assert_eq!(statuses, ["fail", "error", "error", "pass"]);
}

#[test]
fn run_builds_then_verifies() {
  let env = TestEnv::with_fixtures(&["hello.toml"]);

  env
    .omnirig()
    .args(["run", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("4 passed, 0 failed"));
}

#[test]
fn run_skips_verification_after_failed_build() {
  let env = TestEnv::with_fixtures(&["failing.toml"]);

  env
    .omnirig()
    .args(["run", "failing"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("passed").not());
}

#[test]
fn run_with_invalid_verify_suite_runs_nothing() {
  let env = TestEnv::with_fixtures(&[]);
  std::fs::write(
    env.targets_path().join("broken.toml"),
    r#"
name = "broken"
version = "1.0.0"
inherit = ["PATH"]

[[steps]]
kind = "run-build-command"
argv = ["/bin/sh", "-c", "echo ran > marker.txt"]

[[verify.assertions]]
kind = "file-exists"
path = "$${var:MISSING}/bin"
"#,
  )
  .unwrap();

  env
    .omnirig()
    .args(["run", "broken"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Definition of broken is invalid"))
    .stderr(predicate::str::contains("MISSING"))
    .stderr(predicate::str::contains("Build of broken failed").not());

  assert!(!env.install_root("broken").join("marker.txt").exists());
}
