//! Folding build and verification outcomes into a verdict.

use std::fmt::Write as _;

use serde::Serialize;

use crate::consts::OUTPUT_TAIL_LINES;
use crate::execute::process::tail_lines;
use crate::execute::{BuildError, BuildResult, StepFailure};
use crate::verify::{Outcome, VerificationReport, VerifyError};

/// Overall result of a command, ordered by increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
  Success,
  VerifyFailed,
  BuildFailed,
  ConfigInvalid,
  Cancelled,
}

impl Verdict {
  /// Process exit status for this verdict.
  pub fn exit_code(self) -> i32 {
    match self {
      Verdict::Success => 0,
      Verdict::BuildFailed => 1,
      Verdict::ConfigInvalid => 2,
      Verdict::VerifyFailed => 3,
      Verdict::Cancelled => 130,
    }
  }

  pub fn is_success(self) -> bool {
    self == Verdict::Success
  }

  pub fn from_build_error(err: &BuildError) -> Self {
    match err {
      BuildError::Config(_) => Verdict::ConfigInvalid,
      BuildError::StepFailed(_) | BuildError::Io { .. } => Verdict::BuildFailed,
      BuildError::Cancelled { .. } => Verdict::Cancelled,
    }
  }

  pub fn from_verify_error(err: &VerifyError) -> Self {
    match err {
      VerifyError::Config(_) => Verdict::ConfigInvalid,
      VerifyError::Cancelled { .. } => Verdict::Cancelled,
    }
  }

  pub fn of_report(report: &VerificationReport) -> Self {
    if report.is_success() {
      Verdict::Success
    } else {
      Verdict::VerifyFailed
    }
  }

  /// The most severe of several verdicts; `Success` when there are none.
  pub fn worst(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
    verdicts.into_iter().max().unwrap_or(Verdict::Success)
  }
}

/// Outcome of building and then verifying one target.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub target: String,
  pub verdict: Verdict,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub build: Option<BuildResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub verification: Option<VerificationReport>,
  /// Rendered diagnostic text for the failing phase.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl RunSummary {
  /// Combine a build result with the verification that followed it.
  ///
  /// `verification` must be `None` when the build failed: verification never
  /// runs against a failed build.
  pub fn new(
    target: &str,
    build: Result<BuildResult, BuildError>,
    verification: Option<Result<VerificationReport, VerifyError>>,
  ) -> Self {
    let build = match build {
      Ok(result) => result,
      Err(err) => {
        return Self {
          target: target.to_string(),
          verdict: Verdict::from_build_error(&err),
          build: None,
          verification: None,
          error: Some(render_build_error(&err)),
        };
      }
    };

    let (verdict, verification, error) = match verification {
      None => (Verdict::Success, None, None),
      Some(Ok(report)) => {
        let verdict = Verdict::of_report(&report);
        let error = (!verdict.is_success()).then(|| render_verification_failures(&report));
        (verdict, Some(report), error)
      }
      Some(Err(err)) => (Verdict::from_verify_error(&err), None, Some(err.to_string())),
    };

    Self {
      target: target.to_string(),
      verdict,
      build: Some(build),
      verification,
      error,
    }
  }
}

/// Render a build error, including captured output of a failed step.
pub fn render_build_error(err: &BuildError) -> String {
  match err.step_failure() {
    Some(failure) => render_step_failure(failure),
    None => err.to_string(),
  }
}

pub fn render_step_failure(failure: &StepFailure) -> String {
  let mut out = failure.to_string();
  for (label, text) in [("stdout", &failure.stdout), ("stderr", &failure.stderr)] {
    let text = text.trim_end();
    if !text.is_empty() {
      let _ = write!(out, "\n--- {label} ---\n{}", tail_lines(text, OUTPUT_TAIL_LINES));
    }
  }
  out
}

/// One block per failing or erroring assertion, then the captured diagnostics.
///
/// Empty when every assertion passed.
pub fn render_verification_failures(report: &VerificationReport) -> String {
  let total = report.records().len();
  let mut blocks = Vec::new();

  for record in report.failures() {
    let mut block = format!(
      "{} [{}/{}] {}: {}\n  expected: {}",
      record.outcome.label().to_uppercase(),
      record.index + 1,
      total,
      report.target(),
      record.description,
      record.expected
    );
    match &record.outcome {
      Outcome::Fail { actual } => {
        let _ = write!(block, "\n  actual:   {}", indent_continuation(actual));
      }
      Outcome::Error { message } => {
        let _ = write!(block, "\n  error:    {}", indent_continuation(message));
      }
      Outcome::Pass { .. } => {}
    }
    blocks.push(block);
  }

  if blocks.is_empty() {
    return String::new();
  }

  for diagnostic in report.diagnostics() {
    let mut block = format!("--- {} ({}) ---", diagnostic.label, diagnostic.source);
    if let Some(note) = &diagnostic.note {
      let _ = write!(block, "\n[{note}]");
    }
    if !diagnostic.content.is_empty() {
      let _ = write!(block, "\n{}", diagnostic.content);
    }
    blocks.push(block);
  }

  blocks.join("\n\n")
}

fn indent_continuation(text: &str) -> String {
  if text.is_empty() {
    return "(empty)".to_string();
  }
  text.lines().collect::<Vec<_>>().join("\n            ")
}
