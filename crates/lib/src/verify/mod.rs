//! Post-install verification.
//!
//! Every assertion is evaluated independently and in declaration order; a
//! failing or erroring assertion never stops the run. When at least one
//! assertion does not pass, the declared diagnostics (log tails, command
//! output) are captured into the report.

pub mod fs;
pub mod types;
pub mod version;

use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_LOG_TAIL_LINES, OUTPUT_TAIL_LINES};
use crate::env::ExecutionContext;
use crate::execute::process::{Invocation, ProcessRunner, tail_lines};
use crate::execute::{CancelFlag, ExecuteConfig};
use crate::plan::parse_timeout;
use crate::target::{AssertionSpec, CheckSpec, ConfigError, DiagnosticSpec, TargetDefinition};

pub use fs::{Filesystem, FsError, HostFs};
pub use types::{
  Assertion, AssertionRecord, CapturedDiagnostic, Check, Diagnostic, Outcome, VerificationReport, VerifyError,
};

/// Resolved verification suite of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPlan {
  pub context: ExecutionContext,
  pub assertions: Vec<Assertion>,
  pub diagnostics: Vec<Diagnostic>,
}

/// Resolve the verification suite of `definition` against `context`.
///
/// Command extractors run in the install root with the context environment.
pub fn verify_plan(
  definition: &TargetDefinition,
  context: ExecutionContext,
  config: &ExecuteConfig,
) -> Result<VerifyPlan, ConfigError> {
  let assertions = definition
    .verify
    .assertions
    .iter()
    .enumerate()
    .map(|(index, spec)| resolve_assertion(index, spec, &context, config))
    .collect::<Result<Vec<_>, _>>()?;

  let diagnostics = definition
    .verify
    .diagnostics
    .iter()
    .map(|spec| resolve_diagnostic(spec, &context, config))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(VerifyPlan {
    context,
    assertions,
    diagnostics,
  })
}

fn resolve_assertion(
  index: usize,
  spec: &AssertionSpec,
  ctx: &ExecutionContext,
  config: &ExecuteConfig,
) -> Result<Assertion, ConfigError> {
  let label = format!("assertion {}", index + 1);
  let field = |name: &str| format!("{label} {name}");

  let timeout = match &spec.timeout {
    Some(text) => Some(parse_timeout(text).map_err(|e| ConfigError::invalid(ctx.target(), format!("{label}: {e}")))?),
    None => config.default_timeout,
  };

  let (check, default_description) = match &spec.check {
    CheckSpec::FileExists { path } => {
      let path = ctx.resolve_path(path, &field("path"))?;
      let description = format!("{} exists", path.display());
      (Check::FileExists { path }, description)
    }
    CheckSpec::FileFirstLine { path, expected } => {
      let path = ctx.resolve_path(path, &field("path"))?;
      let expected = ctx.resolve(expected, &field("expected"))?;
      let description = format!("first line of {} contains '{}'", path.display(), expected.trim());
      (Check::FileFirstLine { path, expected }, description)
    }
    CheckSpec::CommandOutput { argv, expected } => {
      let invocation = resolve_command(argv, ctx, &label)?.with_timeout(timeout);
      let expected = ctx.resolve(expected, &field("expected"))?;
      let description = format!("`{invocation}` prints '{}'", expected.trim());
      (Check::CommandOutput { invocation, expected }, description)
    }
    CheckSpec::Version {
      argv,
      expected,
      prefix,
    } => {
      let invocation = resolve_command(argv, ctx, &label)?.with_timeout(timeout);
      let expected = match expected {
        Some(template) => ctx.resolve(template, &field("expected"))?,
        None => ctx.version().to_string(),
      };
      let prefix = prefix.as_deref().map(|p| ctx.resolve(p, &field("prefix"))).transpose()?;
      let description = format!("`{invocation}` reports version {expected}");
      (
        Check::Version {
          invocation,
          expected,
          prefix,
        },
        description,
      )
    }
  };

  let description = match &spec.description {
    Some(template) => ctx.resolve(template, &field("description"))?,
    None => default_description,
  };

  Ok(Assertion {
    index,
    description,
    check,
  })
}

fn resolve_diagnostic(
  spec: &DiagnosticSpec,
  ctx: &ExecutionContext,
  config: &ExecuteConfig,
) -> Result<Diagnostic, ConfigError> {
  match spec {
    DiagnosticSpec::LogTail { label, path, lines } => Ok(Diagnostic::LogTail {
      label: label.clone(),
      path: ctx.resolve_path(path, &format!("diagnostic '{label}' path"))?,
      lines: lines.unwrap_or(DEFAULT_LOG_TAIL_LINES),
    }),
    DiagnosticSpec::Command { label, argv, timeout } => {
      let context = format!("diagnostic '{label}'");
      let timeout = match timeout {
        Some(text) => Some(parse_timeout(text).map_err(|e| ConfigError::invalid(ctx.target(), format!("{context}: {e}")))?),
        None => config.default_timeout,
      };
      Ok(Diagnostic::Command {
        label: label.clone(),
        invocation: resolve_command(argv, ctx, &context)?.with_timeout(timeout),
      })
    }
  }
}

fn resolve_command(argv: &[String], ctx: &ExecutionContext, context: &str) -> Result<Invocation, ConfigError> {
  let argv = argv
    .iter()
    .enumerate()
    .map(|(i, arg)| ctx.resolve(arg, &format!("{context} argv[{i}]")))
    .collect::<Result<Vec<_>, _>>()?;
  if argv.iter().any(|arg| arg.contains('\0')) {
    return Err(ConfigError::invalid(ctx.target(), format!("{context}: argv contains a NUL byte")));
  }
  Invocation::from_argv(&argv, ctx.install_root().to_path_buf(), ctx.env().clone())
    .filter(|inv| !inv.program.is_empty())
    .ok_or_else(|| ConfigError::invalid(ctx.target(), format!("{context}: argv is empty")))
}

/// Evaluate every assertion of `plan` and build the report.
///
/// Extractor failures become [`Outcome::Error`]; the only errors returned are
/// cancellation between assertions.
pub async fn run_verification<R: ProcessRunner, F: Filesystem>(
  plan: &VerifyPlan,
  runner: &R,
  fs: &F,
  cancel: &CancelFlag,
) -> Result<VerificationReport, VerifyError> {
  let target = plan.context.target();
  info!(
    target = %target,
    assertions = plan.assertions.len(),
    install_root = %plan.context.install_root().display(),
    "starting verification"
  );

  let mut records = Vec::with_capacity(plan.assertions.len());
  for assertion in &plan.assertions {
    if cancel.is_cancelled() {
      warn!(target = %target, next_assertion = assertion.index + 1, "verification cancelled");
      return Err(VerifyError::Cancelled {
        target: target.to_string(),
        next_assertion: assertion.index,
      });
    }

    let outcome = evaluate(&assertion.check, runner, fs).await;
    if outcome.is_pass() {
      debug!(target = %target, assertion = %assertion.description, "assertion passed");
    } else {
      warn!(target = %target, assertion = %assertion.description, outcome = outcome.label(), "assertion did not pass");
    }

    records.push(AssertionRecord {
      index: assertion.index,
      kind: assertion.check.kind(),
      description: assertion.description.clone(),
      expected: assertion.check.expected(),
      outcome,
    });
  }

  let diagnostics = if records.iter().all(|r| r.outcome.is_pass()) {
    Vec::new()
  } else {
    let mut captured = Vec::with_capacity(plan.diagnostics.len());
    for diagnostic in &plan.diagnostics {
      captured.push(capture_diagnostic(diagnostic, runner, fs).await);
    }
    captured
  };

  let report = VerificationReport::new(
    target.to_string(),
    plan.context.version().to_string(),
    plan.context.install_root().to_path_buf(),
    records,
    diagnostics,
  );
  info!(target = %target, passed = report.passed(), failed = report.failed(), "verification finished");
  Ok(report)
}

async fn evaluate<R: ProcessRunner, F: Filesystem>(check: &Check, runner: &R, fs: &F) -> Outcome {
  match check {
    Check::FileExists { path } => {
      if fs.exists(path) {
        Outcome::Pass {
          actual: "exists".to_string(),
        }
      } else {
        Outcome::Fail {
          actual: "missing".to_string(),
        }
      }
    }
    Check::FileFirstLine { path, expected } => match fs.read_first_line(path) {
      Ok(line) => compare(line.trim(), expected.trim()),
      Err(e) => Outcome::Error { message: e.to_string() },
    },
    Check::CommandOutput { invocation, expected } => match command_stdout(invocation, runner).await {
      Ok(stdout) => compare(stdout.trim(), expected.trim()),
      Err(message) => Outcome::Error { message },
    },
    Check::Version {
      invocation,
      expected,
      prefix,
    } => {
      let Some(needle) = version::version_needle(expected, prefix.as_deref()) else {
        return Outcome::Error {
          message: format!("expected version '{expected}' contains no version number"),
        };
      };
      match command_stdout(invocation, runner).await {
        Ok(stdout) => compare(stdout.trim(), &needle),
        Err(message) => Outcome::Error { message },
      }
    }
  }
}

fn compare(actual: &str, needle: &str) -> Outcome {
  let actual_text = tail_lines(actual, OUTPUT_TAIL_LINES);
  if actual.contains(needle) {
    Outcome::Pass { actual: actual_text }
  } else {
    Outcome::Fail { actual: actual_text }
  }
}

async fn command_stdout<R: ProcessRunner>(invocation: &Invocation, runner: &R) -> Result<String, String> {
  match runner.run(invocation).await {
    Ok(output) if output.status.success() => Ok(output.stdout),
    Ok(output) => {
      let stderr = tail_lines(output.stderr.trim(), OUTPUT_TAIL_LINES);
      if stderr.is_empty() {
        Err(format!("`{invocation}` {}", output.status))
      } else {
        Err(format!("`{invocation}` {}: {stderr}", output.status))
      }
    }
    Err(e) => Err(format!("failed to run `{invocation}`: {e}")),
  }
}

async fn capture_diagnostic<R: ProcessRunner, F: Filesystem>(
  diagnostic: &Diagnostic,
  runner: &R,
  fs: &F,
) -> CapturedDiagnostic {
  match diagnostic {
    Diagnostic::LogTail { label, path, lines } => {
      let (content, note) = match fs.read_tail(path, *lines) {
        Ok(content) => (content, None),
        Err(FsError::NotFound(_)) => (String::new(), Some("file not found".to_string())),
        Err(e) => (String::new(), Some(e.to_string())),
      };
      CapturedDiagnostic {
        label: label.clone(),
        source: path.display().to_string(),
        content,
        note,
      }
    }
    Diagnostic::Command { label, invocation } => {
      let (content, note) = match runner.run(invocation).await {
        Ok(output) => {
          let mut combined = output.stdout;
          if !output.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
              combined.push('\n');
            }
            combined.push_str(&output.stderr);
          }
          let note = (!output.status.success()).then(|| output.status.to_string());
          (tail_lines(combined.trim_end(), OUTPUT_TAIL_LINES), note)
        }
        Err(e) => (String::new(), Some(format!("failed to start: {e}"))),
      };
      CapturedDiagnostic {
        label: label.clone(),
        source: invocation.to_string(),
        content,
        note,
      }
    }
  }
}
