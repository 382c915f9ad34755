//! Types for build execution.
//!
//! This module defines the error types, result types, and configuration
//! for executing a build plan.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::{os::Os, paths};
use crate::target::ConfigError;

use super::process::ExitStatus;

/// Why a step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
  /// The process ran and ended outside its success codes (or timed out).
  Status(ExitStatus),
  /// The process could not be started.
  Spawn(String),
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureReason::Status(status) => write!(f, "{status}"),
      FailureReason::Spawn(message) => write!(f, "failed to start: {message}"),
    }
  }
}

/// Everything known about the step that stopped a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
  pub target: String,
  /// Zero-based step index.
  pub index: usize,
  pub description: String,
  pub command: String,
  pub cwd: PathBuf,
  pub reason: FailureReason,
  pub stdout: String,
  pub stderr: String,
}

impl fmt::Display for StepFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "target '{}': step {} ({}) failed: {}\n  command: {}\n  cwd: {}",
      self.target,
      self.index + 1,
      self.description,
      self.reason,
      self.command,
      self.cwd.display()
    )
  }
}

/// Errors that can occur during build execution.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The definition could not be resolved into a plan. Nothing was executed.
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// A step failed; later steps were not run.
  #[error("{0}")]
  StepFailed(Box<StepFailure>),

  /// The build was cancelled before the given step started.
  #[error("target '{target}': cancelled before step {}", .next_step + 1)]
  Cancelled { target: String, next_step: usize },

  /// I/O error while preparing the install root or writing build records.
  #[error("target '{target}': {context}: {source}")]
  Io {
    target: String,
    context: String,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  pub(crate) fn io(target: &str, context: impl Into<String>, source: std::io::Error) -> Self {
    BuildError::Io {
      target: target.to_string(),
      context: context.into(),
      source,
    }
  }

  /// The failing step, when the error is a step failure.
  pub fn step_failure(&self) -> Option<&StepFailure> {
    match self {
      BuildError::StepFailed(failure) => Some(failure),
      _ => None,
    }
  }
}

/// Outcome of one successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
  pub index: usize,
  pub kind: String,
  pub description: String,
  pub exit_code: Option<i32>,
  pub duration_ms: u64,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
  pub target: String,
  pub version: String,
  pub install_root: PathBuf,
  pub digest: String,
  pub steps: Vec<StepRecord>,
  /// Where the version manifest was written, if the target declares one.
  pub version_manifest: Option<PathBuf>,
}

/// Configuration for build and verification runs.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets to build in parallel.
  pub parallelism: usize,

  /// Timeout for steps and extractors that declare none. `None` waits forever.
  pub default_timeout: Option<Duration>,

  /// Program used for repository steps.
  pub git: String,

  /// Platform whose overrides are applied to definitions.
  pub os: Os,

  /// Parent directory of install roots not declared by a definition.
  pub root_dir: PathBuf,

  /// Environment that inherited variables are taken from.
  pub base_env: BTreeMap<String, String>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      default_timeout: None,
      git: crate::consts::DEFAULT_GIT_PROGRAM.to_string(),
      os: Os::current().unwrap_or(Os::Linux),
      root_dir: paths::root_dir(),
      base_env: host_env(),
    }
  }
}

/// The process environment, without variables whose name or value is not UTF-8.
pub fn host_env() -> BTreeMap<String, String> {
  std::env::vars_os()
    .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
      (Ok(name), Ok(value)) => Some((name, value)),
      (name, _) => {
        debug!(name = ?name.unwrap_or_else(|n| n.to_string_lossy().into_owned()), "skipping non-UTF-8 environment variable");
        None
      }
    })
    .collect()
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
