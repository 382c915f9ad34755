//! Verification plans, outcomes and reports.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::execute::process::Invocation;
use crate::target::ConfigError;

#[derive(Debug, Error)]
pub enum VerifyError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("target '{target}': verification cancelled before assertion {}", .next_assertion + 1)]
  Cancelled { target: String, next_assertion: usize },
}

/// A resolved check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Check {
  FileExists { path: PathBuf },
  FileFirstLine { path: PathBuf, expected: String },
  CommandOutput { invocation: Invocation, expected: String },
  Version {
    invocation: Invocation,
    expected: String,
    prefix: Option<String>,
  },
}

impl Check {
  pub fn kind(&self) -> &'static str {
    match self {
      Check::FileExists { .. } => "file-exists",
      Check::FileFirstLine { .. } => "file-first-line",
      Check::CommandOutput { .. } => "command-output",
      Check::Version { .. } => "version",
    }
  }

  /// Human readable form of what the check expects.
  pub fn expected(&self) -> String {
    match self {
      Check::FileExists { path } => format!("{} exists", path.display()),
      Check::FileFirstLine { expected, .. } | Check::CommandOutput { expected, .. } => expected.trim().to_string(),
      Check::Version { expected, prefix, .. } => {
        crate::verify::version::version_needle(expected, prefix.as_deref()).unwrap_or_else(|| expected.clone())
      }
    }
  }
}

/// A resolved assertion, ready to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
  pub index: usize,
  pub description: String,
  pub check: Check,
}

/// A resolved diagnostic source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
  LogTail { label: String, path: PathBuf, lines: usize },
  Command { label: String, invocation: Invocation },
}

impl Diagnostic {
  pub fn label(&self) -> &str {
    match self {
      Diagnostic::LogTail { label, .. } | Diagnostic::Command { label, .. } => label,
    }
  }
}

/// Result of evaluating one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
  Pass { actual: String },
  Fail { actual: String },
  /// The extractor itself failed.
  Error { message: String },
}

impl Outcome {
  pub fn is_pass(&self) -> bool {
    matches!(self, Outcome::Pass { .. })
  }

  pub fn label(&self) -> &'static str {
    match self {
      Outcome::Pass { .. } => "pass",
      Outcome::Fail { .. } => "fail",
      Outcome::Error { .. } => "error",
    }
  }
}

/// One evaluated assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionRecord {
  pub index: usize,
  pub kind: &'static str,
  pub description: String,
  pub expected: String,
  pub outcome: Outcome,
}

/// Output captured from a diagnostic source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedDiagnostic {
  pub label: String,
  /// File path or command line the content came from.
  pub source: String,
  pub content: String,
  /// Set when the source could not be read; missing logs are noted, not errors.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

/// Ordered outcome of a verification run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
  target: String,
  version: String,
  install_root: PathBuf,
  records: Vec<AssertionRecord>,
  diagnostics: Vec<CapturedDiagnostic>,
}

impl VerificationReport {
  pub fn new(
    target: String,
    version: String,
    install_root: PathBuf,
    records: Vec<AssertionRecord>,
    diagnostics: Vec<CapturedDiagnostic>,
  ) -> Self {
    Self {
      target,
      version,
      install_root,
      records,
      diagnostics,
    }
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn install_root(&self) -> &Path {
    &self.install_root
  }

  /// Records in declaration order.
  pub fn records(&self) -> &[AssertionRecord] {
    &self.records
  }

  pub fn diagnostics(&self) -> &[CapturedDiagnostic] {
    &self.diagnostics
  }

  pub fn passed(&self) -> usize {
    self.records.iter().filter(|r| r.outcome.is_pass()).count()
  }

  pub fn failed(&self) -> usize {
    self.records.len() - self.passed()
  }

  /// True when every assertion passed. A report without assertions passes.
  pub fn is_success(&self) -> bool {
    self.records.iter().all(|r| r.outcome.is_pass())
  }

  /// Records whose outcome is fail or error.
  pub fn failures(&self) -> impl Iterator<Item = &AssertionRecord> {
    self.records.iter().filter(|r| !r.outcome.is_pass())
  }
}
