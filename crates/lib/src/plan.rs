//! Step graph construction.
//!
//! Turns the declared steps of a [`TargetDefinition`] into a [`BuildPlan`]: an
//! ordered list of fully resolved, validated process invocations. Nothing is
//! executed here, so every configuration problem surfaces before the first
//! external command runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::env::ExecutionContext;
use crate::execute::ExecuteConfig;
use crate::execute::process::Invocation;
use crate::target::{ConfigError, StepAction, StepSpec, TargetDefinition};

/// One resolved step, ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
  /// Zero-based position in declaration order.
  pub index: usize,
  pub kind: &'static str,
  pub description: String,
  pub invocation: Invocation,
  pub success_codes: Vec<i32>,
}

impl PlannedStep {
  pub fn is_success(&self, code: i32) -> bool {
    self.success_codes.contains(&code)
  }
}

/// A component pinned by a `checkout-ref` step, recorded in the version manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pin {
  pub component: String,
  pub reference: String,
}

/// The ordered, resolved build of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
  pub context: ExecutionContext,
  pub steps: Vec<PlannedStep>,
  pub pins: Vec<Pin>,
  pub version_manifest: Option<PathBuf>,
}

#[derive(Serialize)]
struct DigestStep<'a> {
  kind: &'a str,
  program: &'a str,
  args: &'a [String],
  cwd: &'a Path,
}

impl BuildPlan {
  pub fn target(&self) -> &str {
    self.context.target()
  }

  pub fn install_root(&self) -> &Path {
    self.context.install_root()
  }

  /// SHA-256 over target, version and each step's program, arguments and working directory.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.context.target().as_bytes());
    hasher.update([0]);
    hasher.update(self.context.version().as_bytes());
    hasher.update([0]);
    for step in &self.steps {
      let entry = DigestStep {
        kind: step.kind,
        program: &step.invocation.program,
        args: &step.invocation.args,
        cwd: &step.invocation.cwd,
      };
      // Serializing plain strings and paths cannot fail.
      if let Ok(bytes) = serde_json::to_vec(&entry) {
        hasher.update(&bytes);
      }
      hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
  }
}

/// Resolve the steps of `definition` into a [`BuildPlan`].
///
/// `definition` must already be specialized for the running platform.
pub fn build_plan(
  definition: &TargetDefinition,
  context: ExecutionContext,
  config: &ExecuteConfig,
) -> Result<BuildPlan, ConfigError> {
  let mut steps = Vec::with_capacity(definition.steps.len());
  let mut pins = Vec::new();

  for (index, spec) in definition.steps.iter().enumerate() {
    let planned = plan_step(index, spec, &context, config)?;

    if let StepAction::CheckoutRef { reference, .. } = &spec.action
      && let Some(component) = component_name(&planned.invocation.cwd)
    {
      pins.push(Pin {
        component,
        reference: planned.invocation.args.last().cloned().unwrap_or_else(|| reference.clone()),
      });
    }

    debug!(
      target = %context.target(),
      index,
      kind = planned.kind,
      command = %planned.invocation,
      "planned step"
    );
    steps.push(planned);
  }

  let version_manifest = definition
    .version_manifest
    .as_deref()
    .map(|template| context.resolve_path(template, "version_manifest"))
    .transpose()?;

  Ok(BuildPlan {
    context,
    steps,
    pins,
    version_manifest,
  })
}

fn plan_step(
  index: usize,
  spec: &StepSpec,
  context: &ExecutionContext,
  config: &ExecuteConfig,
) -> Result<PlannedStep, ConfigError> {
  let target = context.target();
  let label = format!("step {}", index + 1);
  let invalid = |message: String| ConfigError::InvalidStep {
    target: target.to_string(),
    index,
    message,
  };
  let resolve = |template: &str, field: &str| -> Result<String, ConfigError> {
    let value = context.resolve(template, &format!("{label} {field}"))?;
    if value.contains('\0') {
      return Err(invalid(format!("{field} contains a NUL byte")));
    }
    Ok(value)
  };
  let resolve_dir = |template: &str, field: &str| -> Result<PathBuf, ConfigError> {
    let value = resolve(template, field)?;
    if value.is_empty() {
      return Err(invalid(format!("{field} is empty")));
    }
    let path = PathBuf::from(value);
    Ok(if path.is_absolute() {
      path
    } else {
      context.install_root().join(path)
    })
  };

  let root = context.install_root().to_path_buf();
  let git = config.git.clone();

  let (program, args, default_cwd, default_description) = match &spec.action {
    StepAction::FetchRepo { url, dest } => {
      let url = resolve(url, "url")?;
      reject_option_like(&url, "url").map_err(invalid)?;
      let dest = resolve_dir(dest, "dest")?;
      let description = format!("fetch {url}");
      let args = vec![
        "clone".to_string(),
        "--".to_string(),
        url,
        dest.to_string_lossy().into_owned(),
      ];
      (git, args, root, description)
    }
    StepAction::CheckoutRef { repo, reference } => {
      let repo = resolve_dir(repo, "repo")?;
      let reference = resolve(reference, "reference")?;
      reject_option_like(&reference, "reference").map_err(invalid)?;
      let description = format!("checkout {reference} in {}", repo.display());
      (git, vec!["checkout".to_string(), reference], repo, description)
    }
    StepAction::InitSubmodules { repo, recursive } => {
      let repo = resolve_dir(repo, "repo")?;
      let mut args = vec!["submodule".to_string(), "update".to_string(), "--init".to_string()];
      if *recursive {
        args.push("--recursive".to_string());
      }
      let description = format!("init submodules in {}", repo.display());
      (git, args, repo, description)
    }
    StepAction::RunBuildCommand { argv } => {
      let argv = argv
        .iter()
        .enumerate()
        .map(|(i, arg)| resolve(arg, &format!("argv[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
      let Some((program, args)) = argv.split_first() else {
        return Err(invalid("argv is empty".to_string()));
      };
      if program.is_empty() {
        return Err(invalid("program name is empty".to_string()));
      }
      let description = format!("run {}", argv.join(" "));
      (program.clone(), args.to_vec(), root, description)
    }
  };

  let cwd = match &spec.cwd {
    Some(template) => resolve_dir(template, "cwd")?,
    None => default_cwd,
  };

  let env = context.overlay(&spec.env, &label)?;
  if env.iter().any(|(k, v)| k.contains('\0') || v.contains('\0')) {
    return Err(invalid("environment contains a NUL byte".to_string()));
  }

  let timeout = match &spec.timeout {
    Some(text) => Some(parse_timeout(text).map_err(invalid)?),
    None => config.default_timeout,
  };

  let success_codes = match &spec.success_codes {
    Some(codes) if codes.is_empty() => return Err(invalid("success_codes is empty".to_string())),
    Some(codes) => codes.clone(),
    None => vec![0],
  };

  let description = match &spec.description {
    Some(template) => resolve(template, "description")?,
    None => default_description,
  };

  Ok(PlannedStep {
    index,
    kind: spec.action.kind(),
    description,
    invocation: Invocation {
      program,
      args,
      cwd,
      env,
      timeout,
    },
    success_codes,
  })
}

/// Parse a humantime duration, rejecting zero.
pub fn parse_timeout(text: &str) -> Result<Duration, String> {
  let duration = humantime::parse_duration(text.trim()).map_err(|e| format!("invalid timeout '{text}': {e}"))?;
  if duration.is_zero() {
    return Err(format!("invalid timeout '{text}': must be greater than zero"));
  }
  Ok(duration)
}

fn reject_option_like(value: &str, field: &str) -> Result<(), String> {
  if value.is_empty() {
    return Err(format!("{field} is empty"));
  }
  if value.starts_with('-') {
    return Err(format!("{field} '{value}' must not start with '-'"));
  }
  Ok(())
}

fn component_name(repo: &Path) -> Option<String> {
  repo.file_name().map(|name| name.to_string_lossy().into_owned())
}
