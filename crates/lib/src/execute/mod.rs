//! Build execution.
//!
//! Runs the steps of a [`BuildPlan`] one after another through a
//! [`ProcessRunner`]. The first step that fails stops the build: later steps
//! never run, nothing is retried and the install root is left as it is.

pub mod cancel;
pub mod process;
pub mod receipt;
pub mod types;

use std::time::Instant;

use tokio::fs;
use tracing::{error, info, warn};

use crate::plan::{BuildPlan, PlannedStep};
use crate::platform::platform_triple;

pub use cancel::CancelFlag;
pub use process::{ExitStatus, Invocation, ProcessOutput, ProcessRunner, SystemRunner};
pub use receipt::{BuildReceipt, read_receipt};
pub use types::{BuildError, BuildResult, ExecuteConfig, FailureReason, StepFailure, StepRecord};

/// Execute every step of `plan` in order.
///
/// The install root is created first. `cancel` is checked before each step;
/// a step that is already running is never interrupted. On success the build
/// receipt and, when declared, the version manifest are written into the
/// install root.
pub async fn execute_plan<R: ProcessRunner>(
  plan: &BuildPlan,
  runner: &R,
  cancel: &CancelFlag,
) -> Result<BuildResult, BuildError> {
  let target = plan.target();
  let root = plan.install_root();
  info!(target = %target, steps = plan.steps.len(), install_root = %root.display(), "starting build");

  fs::create_dir_all(root)
    .await
    .map_err(|e| BuildError::io(target, format!("failed to create install root {}", root.display()), e))?;

  let mut records = Vec::with_capacity(plan.steps.len());
  for step in &plan.steps {
    if cancel.is_cancelled() {
      warn!(target = %target, next_step = step.index + 1, "build cancelled");
      return Err(BuildError::Cancelled {
        target: target.to_string(),
        next_step: step.index,
      });
    }
    records.push(run_step(target, step, runner).await?);
  }

  if let Some(path) = &plan.version_manifest {
    receipt::write_version_manifest(plan, path)
      .await
      .map_err(|e| BuildError::io(target, format!("failed to write version manifest {}", path.display()), e))?;
  }

  let digest = plan.digest();
  let build_receipt = BuildReceipt {
    format: receipt::RECEIPT_FORMAT,
    target: target.to_string(),
    version: plan.context.version().to_string(),
    platform: platform_triple(),
    digest: digest.clone(),
    steps: records.clone(),
  };
  receipt::write_receipt(root, &build_receipt)
    .await
    .map_err(|e| BuildError::io(target, "failed to write build receipt", e))?;

  info!(target = %target, steps = records.len(), "build succeeded");

  Ok(BuildResult {
    target: target.to_string(),
    version: plan.context.version().to_string(),
    install_root: root.to_path_buf(),
    digest,
    steps: records,
    version_manifest: plan.version_manifest.clone(),
  })
}

async fn run_step<R: ProcessRunner>(target: &str, step: &PlannedStep, runner: &R) -> Result<StepRecord, BuildError> {
  info!(
    target = %target,
    step = step.index + 1,
    kind = step.kind,
    description = %step.description,
    "running step"
  );

  let fail = |reason: FailureReason, stdout: String, stderr: String| {
    error!(target = %target, step = step.index + 1, command = %step.invocation, reason = %reason, "step failed");
    BuildError::StepFailed(Box::new(StepFailure {
      target: target.to_string(),
      index: step.index,
      description: step.description.clone(),
      command: step.invocation.to_string(),
      cwd: step.invocation.cwd.clone(),
      reason,
      stdout,
      stderr,
    }))
  };

  let started = Instant::now();
  let output = match runner.run(&step.invocation).await {
    Ok(output) => output,
    Err(e) => return Err(fail(FailureReason::Spawn(e.to_string()), String::new(), String::new())),
  };

  match output.status {
    ExitStatus::Code(code) if step.is_success(code) => Ok(StepRecord {
      index: step.index,
      kind: step.kind.to_string(),
      description: step.description.clone(),
      exit_code: Some(code),
      duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }),
    status => Err(fail(FailureReason::Status(status), output.stdout, output.stderr)),
  }
}
