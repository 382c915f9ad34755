//! High level entry points: plan, build, verify and run targets.
//!
//! Every function specializes the definition for `config.os` and resolves a
//! fresh [`ExecutionContext`](crate::env::ExecutionContext), so each run owns
//! its context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::env::{ExecutionContext, ResolveOptions, resolve_context};
use crate::execute::{BuildError, BuildResult, CancelFlag, ExecuteConfig, ProcessRunner, execute_plan};
use crate::plan::{BuildPlan, build_plan};
use crate::report::RunSummary;
use crate::target::{ConfigError, TargetDefinition};
use crate::verify::{Filesystem, VerificationReport, VerifyError, VerifyPlan, run_verification, verify_plan};

/// Where and against which version to verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
  /// Install root to check. Defaults to the target's own install root.
  pub install_root: Option<&'a Path>,
  /// Replaces the pinned version in templates and version assertions.
  pub expected_version: Option<&'a str>,
}

fn specialize(
  definition: &TargetDefinition,
  config: &ExecuteConfig,
  install_root: Option<&Path>,
  version: Option<&str>,
) -> Result<(TargetDefinition, ExecutionContext), ConfigError> {
  let definition = definition.for_platform(config.os)?;
  let context = resolve_context(
    &definition,
    &ResolveOptions {
      base_env: &config.base_env,
      default_root: &config.root_dir,
      install_root,
      version,
    },
  )?;
  Ok((definition, context))
}

/// Resolve the build plan of a target without executing anything.
pub fn plan_build(definition: &TargetDefinition, config: &ExecuteConfig) -> Result<BuildPlan, ConfigError> {
  let (definition, context) = specialize(definition, config, None, None)?;
  build_plan(&definition, context, config)
}

/// Resolve the verification suite of a target without executing anything.
pub fn plan_verify(
  definition: &TargetDefinition,
  config: &ExecuteConfig,
  options: VerifyOptions<'_>,
) -> Result<VerifyPlan, ConfigError> {
  let (definition, context) = specialize(definition, config, options.install_root, options.expected_version)?;
  verify_plan(&definition, context, config)
}

/// Build one target.
pub async fn build_target<R: ProcessRunner>(
  definition: &TargetDefinition,
  config: &ExecuteConfig,
  runner: &R,
  cancel: &CancelFlag,
) -> Result<BuildResult, BuildError> {
  let plan = plan_build(definition, config)?;
  execute_plan(&plan, runner, cancel).await
}

/// Build several targets in parallel, at most `config.parallelism` at a time.
///
/// All targets are planned first: any configuration error, including two
/// targets sharing an install root, is returned before anything runs.
/// Results are in input order.
pub async fn build_targets<R: ProcessRunner + 'static>(
  definitions: &[TargetDefinition],
  config: &ExecuteConfig,
  runner: Arc<R>,
  cancel: &CancelFlag,
) -> Result<Vec<(String, Result<BuildResult, BuildError>)>, ConfigError> {
  let plans = definitions
    .iter()
    .map(|definition| plan_build(definition, config))
    .collect::<Result<Vec<_>, _>>()?;
  check_distinct_roots(&plans)?;

  info!(targets = plans.len(), parallelism = config.parallelism, "building targets");

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let names: Vec<String> = plans.iter().map(|plan| plan.target().to_string()).collect();

  for (index, plan) in plans.into_iter().enumerate() {
    let runner = runner.clone();
    let semaphore = semaphore.clone();
    let cancel = cancel.clone();

    join_set.spawn(async move {
      let result = match semaphore.acquire().await {
        Ok(_permit) => execute_plan(&plan, runner.as_ref(), &cancel).await,
        Err(_) => Err(BuildError::Cancelled {
          target: plan.target().to_string(),
          next_step: 0,
        }),
      };
      (index, result)
    });
  }

  let mut results: Vec<Option<Result<BuildResult, BuildError>>> = names.iter().map(|_| None).collect();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((index, result)) => results[index] = Some(result),
      Err(e) => error!(error = %e, "build task panicked"),
    }
  }

  Ok(
    names
      .into_iter()
      .zip(results)
      .map(|(name, result)| {
        let result = result.unwrap_or_else(|| {
          Err(BuildError::io(
            &name,
            "build task did not complete",
            std::io::Error::other("task panicked"),
          ))
        });
        (name, result)
      })
      .collect(),
  )
}

fn check_distinct_roots(plans: &[BuildPlan]) -> Result<(), ConfigError> {
  let mut seen: BTreeMap<PathBuf, &str> = BTreeMap::new();
  for plan in plans {
    if let Some(first) = seen.insert(plan.install_root().to_path_buf(), plan.target()) {
      return Err(ConfigError::SharedInstallRoot {
        first: first.to_string(),
        second: plan.target().to_string(),
        root: plan.install_root().to_path_buf(),
      });
    }
  }
  Ok(())
}

/// Verify an install of one target.
pub async fn verify_target<R: ProcessRunner, F: Filesystem>(
  definition: &TargetDefinition,
  config: &ExecuteConfig,
  options: VerifyOptions<'_>,
  runner: &R,
  fs: &F,
  cancel: &CancelFlag,
) -> Result<VerificationReport, VerifyError> {
  let plan = plan_verify(definition, config, options)?;
  run_verification(&plan, runner, fs, cancel).await
}

/// Build a target, then verify the fresh install.
///
/// Both the build and the verification suite are resolved before the first
/// step runs, so a configuration error anywhere in the definition leaves the
/// install root untouched. Verification is skipped when the build fails.
pub async fn run_target<R: ProcessRunner, F: Filesystem>(
  definition: &TargetDefinition,
  config: &ExecuteConfig,
  runner: &R,
  fs: &F,
  cancel: &CancelFlag,
) -> RunSummary {
  let plans = plan_build(definition, config).and_then(|build| {
    let options = VerifyOptions {
      install_root: Some(build.install_root()),
      expected_version: None,
    };
    let verify = plan_verify(definition, config, options)?;
    Ok((build, verify))
  });
  let (plan, suite) = match plans {
    Ok(plans) => plans,
    Err(err) => {
      debug!(target = %definition.name, error = %err, "target definition rejected");
      return RunSummary::new(&definition.name, Err(BuildError::Config(err)), None);
    }
  };

  let build = execute_plan(&plan, runner, cancel).await;
  let verification = match &build {
    Ok(_) => Some(run_verification(&suite, runner, fs, cancel).await),
    Err(err) => {
      debug!(target = %definition.name, error = %err, "skipping verification after failed build");
      None
    }
  };
  RunSummary::new(&definition.name, build, verification)
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use std::time::Duration;

  use tempfile::TempDir;

  use super::*;
  use crate::platform::os::Os;
  use crate::report::Verdict;
  use crate::util::testutil::{MemoryFs, ScriptedRunner, exited};
  use crate::verify::HostFs;

  fn config(root: &Path) -> ExecuteConfig {
    ExecuteConfig {
      parallelism: 2,
      default_timeout: Some(Duration::from_secs(30)),
      git: "git".to_string(),
      os: Os::Linux,
      root_dir: root.to_path_buf(),
      base_env: BTreeMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
    }
  }

  fn target(name: &str, extra: &str) -> TargetDefinition {
    let text = format!(
      r#"
name = "{name}"
version = "1.2.3"
version_manifest = "version-manifest.txt"

[[steps]]
kind = "run-build-command"
argv = ["make"]

[[verify.assertions]]
kind = "file-first-line"
path = "version-manifest.txt"
expected = "$${{name}} $${{version}}"
{extra}
"#
    );
    TargetDefinition::from_toml(&text, Path::new("t.toml")).unwrap()
  }

  #[tokio::test]
  async fn run_builds_then_verifies() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = ScriptedRunner::succeeding();

    let summary = run_target(&target("agent", ""), &config, &runner, &HostFs, &CancelFlag::new()).await;

    assert_eq!(summary.verdict, Verdict::Success);
    assert_eq!(summary.verification.as_ref().map(|r| r.passed()), Some(1));
    assert!(temp.path().join("agent/version-manifest.txt").is_file());
  }

  #[tokio::test]
  async fn failed_build_skips_verification() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = ScriptedRunner::new(|_| Ok(exited(2, "")));

    let summary = run_target(&target("agent", ""), &config, &runner, &MemoryFs::new(), &CancelFlag::new()).await;

    assert_eq!(summary.verdict, Verdict::BuildFailed);
    assert!(summary.verification.is_none());
    assert_eq!(runner.calls().len(), 1);
  }

  #[tokio::test]
  async fn cyclic_environment_runs_nothing() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = ScriptedRunner::succeeding();
    let def = target("agent", "[env]\nA = \"$${var:B}\"\nB = \"$${var:A}\"\n");

    let summary = run_target(&def, &config, &runner, &MemoryFs::new(), &CancelFlag::new()).await;

    assert_eq!(summary.verdict, Verdict::ConfigInvalid);
    assert!(summary.error.unwrap().contains("cyclic variable reference: A -> B -> A"));
    assert!(runner.calls().is_empty());
  }

  #[tokio::test]
  async fn invalid_verify_suite_runs_nothing() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = ScriptedRunner::succeeding();
    let def = target(
      "agent",
      "[[verify.assertions]]\nkind = \"file-exists\"\npath = \"$${var:MISSING}/bin\"\n",
    );

    let summary = run_target(&def, &config, &runner, &MemoryFs::new(), &CancelFlag::new()).await;

    assert_eq!(summary.verdict, Verdict::ConfigInvalid);
    assert!(summary.build.is_none());
    assert!(summary.error.unwrap().contains("MISSING"));
    assert!(runner.calls().is_empty());
    assert!(!temp.path().join("agent").exists());
  }

  #[tokio::test]
  async fn verify_uses_explicit_root_and_version() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let fs = MemoryFs::new().with_file("/srv/agent/version-manifest.txt", "agent 1.2.4\n");

    let report = verify_target(
      &target("agent", ""),
      &config,
      VerifyOptions {
        install_root: Some(Path::new("/srv/agent")),
        expected_version: Some("1.2.4"),
      },
      &ScriptedRunner::succeeding(),
      &fs,
      &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.install_root(), Path::new("/srv/agent"));
  }

  #[tokio::test]
  async fn builds_targets_in_parallel_with_results_in_order() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = Arc::new(ScriptedRunner::new(|inv| {
      if inv.cwd.ends_with("broken") {
        Ok(exited(1, ""))
      } else {
        Ok(exited(0, ""))
      }
    }));
    let defs = vec![target("agent", ""), target("broken", ""), target("lib", "")];

    let results = build_targets(&defs, &config, runner.clone(), &CancelFlag::new())
      .await
      .unwrap();

    let names: Vec<_> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["agent", "broken", "lib"]);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.as_ref().unwrap_err().step_failure().is_some());
    assert!(results[2].1.is_ok());
    assert_eq!(runner.calls().len(), 3);
  }

  #[tokio::test]
  async fn shared_install_root_is_rejected_before_running() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let runner = Arc::new(ScriptedRunner::succeeding());
    let defs = vec![
      target("agent", ""),
      TargetDefinition {
        name: "agent-copy".to_string(),
        install_root: Some(temp.path().join("agent").to_string_lossy().into_owned()),
        ..target("agent-copy", "")
      },
    ];

    let err = build_targets(&defs, &config, runner.clone(), &CancelFlag::new())
      .await
      .unwrap_err();

    assert!(matches!(err, ConfigError::SharedInstallRoot { ref first, ref second, .. } if first == "agent" && second == "agent-copy"));
    assert!(runner.calls().is_empty());
  }

  #[test]
  fn plan_applies_platform_override() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    let def = target(
      "agent",
      "[platform.darwin]\ninstall_root = \"/Applications/Agent\"\n[[platform.darwin.steps]]\nkind = \"run-build-command\"\nargv = [\"xcodebuild\"]\n",
    );

    let linux = plan_build(&def, &config).unwrap();
    assert_eq!(linux.steps[0].invocation.program, "make");

    config.os = Os::MacOs;
    let mac = plan_build(&def, &config).unwrap();
    assert_eq!(mac.install_root(), Path::new("/Applications/Agent"));
    assert_eq!(mac.steps[0].invocation.program, "xcodebuild");
  }
}
