//! Unknown-key detection for step, assertion and diagnostic tables.
//!
//! These tables mix common keys with keys selected by `kind`, which serde
//! cannot reject on its own. The raw TOML is checked against the keys each
//! kind accepts after it has deserialized successfully.

use toml::{Table, Value};

use super::ConfigError;

const STEP_COMMON: &[&str] = &["kind", "description", "cwd", "env", "timeout", "success_codes"];
const ASSERTION_COMMON: &[&str] = &["kind", "description", "timeout"];
const DIAGNOSTIC_COMMON: &[&str] = &["kind", "label"];

fn step_keys(kind: &str) -> &'static [&'static str] {
  match kind {
    "fetch-repo" => &["url", "dest"],
    "checkout-ref" => &["repo", "reference"],
    "init-submodules" => &["repo", "recursive"],
    "run-build-command" => &["argv"],
    _ => &[],
  }
}

fn assertion_keys(kind: &str) -> &'static [&'static str] {
  match kind {
    "file-exists" => &["path"],
    "file-first-line" => &["path", "expected"],
    "command-output" => &["argv", "expected"],
    "version" => &["argv", "expected", "prefix"],
    _ => &[],
  }
}

fn diagnostic_keys(kind: &str) -> &'static [&'static str] {
  match kind {
    "log-tail" => &["path", "lines"],
    "command" => &["argv", "timeout"],
    _ => &[],
  }
}

/// Reject keys that no kind of step, assertion or diagnostic accepts.
pub(super) fn check_unknown_fields(target: &str, document: &Table) -> Result<(), ConfigError> {
  check_section(target, document, "")?;

  if let Some(Value::Table(platforms)) = document.get("platform") {
    for (os, overlay) in platforms {
      if let Value::Table(overlay) = overlay {
        check_section(target, overlay, &format!("platform.{os}: "))?;
      }
    }
  }
  Ok(())
}

fn check_section(target: &str, section: &Table, scope: &str) -> Result<(), ConfigError> {
  for (index, step) in tables(section.get("steps")).enumerate() {
    if let Some(key) = unknown_key(step, STEP_COMMON, step_keys) {
      return Err(ConfigError::InvalidStep {
        target: target.to_string(),
        index,
        message: format!("{scope}unknown field `{key}`"),
      });
    }
  }

  let Some(Value::Table(verify)) = section.get("verify") else {
    return Ok(());
  };
  for (index, assertion) in tables(verify.get("assertions")).enumerate() {
    if let Some(key) = unknown_key(assertion, ASSERTION_COMMON, assertion_keys) {
      return Err(ConfigError::invalid(
        target,
        format!("{scope}assertion {}: unknown field `{key}`", index + 1),
      ));
    }
  }
  for (index, diagnostic) in tables(verify.get("diagnostics")).enumerate() {
    if let Some(key) = unknown_key(diagnostic, DIAGNOSTIC_COMMON, diagnostic_keys) {
      return Err(ConfigError::invalid(
        target,
        format!("{scope}diagnostic {}: unknown field `{key}`", index + 1),
      ));
    }
  }
  Ok(())
}

fn tables(value: Option<&Value>) -> impl Iterator<Item = &Table> {
  value
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
    .filter_map(Value::as_table)
}

fn unknown_key<'a>(
  table: &'a Table,
  common: &[&str],
  by_kind: fn(&str) -> &'static [&'static str],
) -> Option<&'a str> {
  let specific = by_kind(table.get("kind").and_then(Value::as_str).unwrap_or_default());
  table
    .keys()
    .map(String::as_str)
    .find(|key| !common.contains(key) && !specific.contains(key))
}
