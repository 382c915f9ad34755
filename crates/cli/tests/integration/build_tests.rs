//! Tests for `omnirig build`.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_runs_steps_into_install_root() {
  let env = TestEnv::with_fixtures(&["hello.toml"]);

  env
    .omnirig()
    .args(["build", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built hello 1.2.3"));

  let root = env.install_root("hello");
  assert_eq!(std::fs::read_to_string(root.join("hello.txt")).unwrap(), "hello 1.2.3\n");
  assert_eq!(std::fs::read_to_string(root.join("build.log")).unwrap(), "built\n");
  assert_eq!(
    std::fs::read_to_string(root.join("version-manifest.txt")).unwrap(),
    "hello 1.2.3\n"
  );
  assert!(root.join(".omnirig-build.json").exists());
}

#[test]
fn failing_step_stops_the_build() {
  let env = TestEnv::with_fixtures(&["failing.toml"]);

  env
    .omnirig()
    .args(["build", "failing"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("step 2 (compile) failed: exit code 7"))
    .stderr(predicate::str::contains("boom"));

  let root = env.install_root("failing");
  assert!(root.join("first.txt").exists());
  assert!(!root.join("third.txt").exists());
  assert!(!root.join(".omnirig-build.json").exists());
}

#[test]
fn cyclic_environment_is_a_config_error() {
  let env = TestEnv::with_fixtures(&["cyclic.toml"]);

  env
    .omnirig()
    .args(["build", "cyclic"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cyclic variable reference"))
    .stderr(predicate::str::contains("A -> B -> A"));

  assert!(!env.install_root("cyclic").join("marker.txt").exists());
}

#[test]
fn unknown_target_is_a_config_error() {
  let env = TestEnv::with_fixtures(&[]);

  env.omnirig().args(["build", "nope"]).assert().code(2);
}

#[test]
fn json_output_lists_every_target_in_order() {
  let env = TestEnv::with_fixtures(&["hello.toml", "failing.toml"]);

  let output = env
    .omnirig()
    .args(["--output", "json", "build", "failing", "hello"])
    .output()
    .unwrap();

  assert_eq!(output.status.code(), Some(1));
  let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let entries = entries.as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0]["target"], "failing");
  assert_eq!(entries[0]["verdict"], "build-failed");
  assert!(entries[0]["error"].as_str().unwrap().contains("boom"));
  assert_eq!(entries[1]["target"], "hello");
  assert_eq!(entries[1]["verdict"], "success");
  assert_eq!(entries[1]["result"]["version"], "1.2.3");
}

#[test]
fn plan_does_not_touch_the_install_root() {
  let env = TestEnv::with_fixtures(&["hello.toml"]);

  env
    .omnirig()
    .args(["plan", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("write greeting"))
    .stdout(predicate::str::contains("greeting names the version"));

  assert!(!env.install_root("hello").join("hello.txt").exists());
}
