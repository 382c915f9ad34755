use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use omnirig_lib::execute::{BuildError, CancelFlag, ExecuteConfig, ExitStatus, FailureReason, SystemRunner, read_receipt};
use omnirig_lib::pipeline::{VerifyOptions, build_targets, run_target, verify_target};
use omnirig_lib::report::Verdict;
use omnirig_lib::target::{ConfigError, TargetDefinition};
use omnirig_lib::verify::{HostFs, Outcome};

const TOOL: &str = r#"
name = "tool"
version = "2.4.1"
inherit = ["PATH"]

[env]
TOOL_HOME = "$${out}/share/tool"

[[steps]]
kind = "run-build-command"
description = "lay out tree"
argv = ["/bin/sh", "-c", "mkdir -p bin \"$TOOL_HOME\""]

[[steps]]
kind = "run-build-command"
description = "install launcher"
argv = ["/bin/sh", "-c", "printf '#!/bin/sh\\necho tool v$${version}\\n' > bin/tool && chmod +x bin/tool"]

[[verify.assertions]]
kind = "file-exists"
path = "share/tool"

[[verify.assertions]]
kind = "version"
argv = ["$${out}/bin/tool"]
prefix = "v"

[[verify.diagnostics]]
kind = "command"
label = "tree"
argv = ["/bin/ls", "-R"]
"#;

fn config(root: &Path) -> ExecuteConfig {
  let base_env: BTreeMap<String, String> = std::env::vars().filter(|(k, _)| k == "PATH").collect();
  ExecuteConfig {
    parallelism: 2,
    root_dir: root.to_path_buf(),
    base_env,
    ..ExecuteConfig::default()
  }
}

fn definition(text: &str) -> TargetDefinition {
  TargetDefinition::from_toml(text, Path::new("inline.toml")).unwrap()
}

#[tokio::test]
async fn build_then_verify_real_install() {
  let temp = TempDir::new().unwrap();
  let def = definition(TOOL);
  let config = config(temp.path());

  let summary = run_target(&def, &config, &SystemRunner, &HostFs, &CancelFlag::new()).await;

  assert_eq!(summary.verdict, Verdict::Success, "{:?}", summary.error);
  let build = summary.build.unwrap();
  assert_eq!(build.install_root, temp.path().join("tool"));
  assert_eq!(build.steps.len(), 2);
  assert!(build.install_root.join("bin/tool").exists());

  let report = summary.verification.unwrap();
  assert_eq!(report.passed(), 2);
  assert!(report.diagnostics().is_empty());

  let receipt = read_receipt(&build.install_root).unwrap();
  assert_eq!(receipt.version, "2.4.1");
  assert_eq!(receipt.digest, build.digest);
}

#[tokio::test]
async fn verify_against_other_version_captures_diagnostics() {
  let temp = TempDir::new().unwrap();
  let def = definition(TOOL);
  let config = config(temp.path());
  run_target(&def, &config, &SystemRunner, &HostFs, &CancelFlag::new()).await;

  let report = verify_target(
    &def,
    &config,
    VerifyOptions {
      install_root: None,
      expected_version: Some("2.5.0"),
    },
    &SystemRunner,
    &HostFs,
    &CancelFlag::new(),
  )
  .await
  .unwrap();

  assert!(!report.is_success());
  assert_eq!(
    report.records()[1].outcome,
    Outcome::Fail {
      actual: "tool v2.4.1".to_string()
    }
  );
  let tree = &report.diagnostics()[0];
  assert_eq!(tree.label, "tree");
  assert!(tree.content.contains("bin"));
}

#[tokio::test]
async fn step_timeout_fails_the_build() {
  let temp = TempDir::new().unwrap();
  let def = definition(
    r#"
name = "slow"
version = "1.0.0"
inherit = ["PATH"]

[[steps]]
kind = "run-build-command"
argv = ["/bin/sh", "-c", "echo compiling; sleep 5"]
timeout = "500ms"

[[steps]]
kind = "run-build-command"
argv = ["/bin/sh", "-c", "touch after"]
"#,
  );
  let config = config(temp.path());

  let results = build_targets(&[def], &config, Arc::new(SystemRunner), &CancelFlag::new())
    .await
    .unwrap();

  let (target, result) = &results[0];
  assert_eq!(target, "slow");
  let failure = result.as_ref().unwrap_err().step_failure().unwrap();
  assert_eq!(failure.index, 0);
  assert_eq!(failure.reason, FailureReason::Status(ExitStatus::TimedOut));
  assert_eq!(failure.stdout.trim(), "compiling");
  assert!(!temp.path().join("slow/after").exists());
}

#[tokio::test]
async fn parallel_builds_report_each_target() {
  let temp = TempDir::new().unwrap();
  let tool = definition(TOOL);
  let broken = definition(
    r#"
name = "broken"
version = "0.0.1"
inherit = ["PATH"]

[[steps]]
kind = "run-build-command"
argv = ["/bin/sh", "-c", "exit 4"]
"#,
  );
  let config = config(temp.path());

  let results = build_targets(&[broken, tool], &config, Arc::new(SystemRunner), &CancelFlag::new())
    .await
    .unwrap();

  let names: Vec<_> = results.iter().map(|(name, _)| name.as_str()).collect();
  assert_eq!(names, ["broken", "tool"]);
  assert!(matches!(results[0].1, Err(BuildError::StepFailed(_))));
  assert!(results[1].1.is_ok());
}

#[tokio::test]
async fn targets_sharing_an_install_root_are_rejected() {
  let temp = TempDir::new().unwrap();
  let shared = |name: &str| {
    definition(&format!(
      "name = \"{name}\"\nversion = \"1.0\"\ninstall_root = \"{}\"\n",
      temp.path().join("shared").display()
    ))
  };
  let config = config(temp.path());

  let err = build_targets(
    &[shared("one"), shared("two")],
    &config,
    Arc::new(SystemRunner),
    &CancelFlag::new(),
  )
  .await
  .unwrap_err();

  assert!(matches!(err, ConfigError::SharedInstallRoot { .. }));
  assert!(!temp.path().join("shared").exists());
}
