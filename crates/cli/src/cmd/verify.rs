//! Implementation of the `omnirig verify` command.
//!
//! Checks an existing install root against a target's verification suite.
//! Every assertion is reported; each failing one gets a diagnostic block on
//! stderr. Exits 0 when all assertions pass and 1 otherwise.

use std::path::Path;

use anyhow::Result;

use omnirig_lib::execute::{CancelFlag, SystemRunner, read_receipt};
use omnirig_lib::pipeline::{VerifyOptions, verify_target};
use omnirig_lib::report::{Verdict, render_verification_failures};
use omnirig_lib::verify::{HostFs, VerificationReport, VerifyError};

use crate::output::{print_diagnostics, print_error, print_failure, print_info, print_json, print_stat, print_success, truncate_hash};

use super::{Settings, config_failure, display_path, exit_status, runtime};

pub fn cmd_verify(settings: &Settings, target: &str, install_root: &Path, expect_version: Option<&str>) -> Result<u8> {
  let definition = match settings.load(target) {
    Ok(definition) => definition,
    Err(e) => return Ok(config_failure(&e)),
  };

  let options = VerifyOptions {
    install_root: Some(install_root),
    expected_version: expect_version,
  };

  let cancel = CancelFlag::new();
  let rt = runtime(&cancel)?;
  let outcome = rt.block_on(verify_target(
    &definition,
    &settings.config,
    options,
    &SystemRunner,
    &HostFs,
    &cancel,
  ));

  let report = match outcome {
    Ok(report) => report,
    Err(VerifyError::Config(e)) => return Ok(config_failure(&e)),
    Err(e) => {
      print_error(&e.to_string());
      return Ok(exit_status(Verdict::from_verify_error(&e)));
    }
  };

  if settings.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
    print_diagnostics(&render_verification_failures(&report));
  }

  // A standalone verification only distinguishes pass from fail.
  Ok(if report.is_success() { 0 } else { 1 })
}

pub(super) fn print_report(report: &VerificationReport) {
  print_info(&format!(
    "Verifying {} {} in {}",
    report.target(),
    report.version(),
    display_path(report.install_root())
  ));
  if let Some(receipt) = read_receipt(report.install_root()) {
    print_stat(
      "Built",
      &format!("{} {} (plan {})", receipt.target, receipt.version, truncate_hash(&receipt.digest)),
    );
  }

  for record in report.records() {
    if record.outcome.is_pass() {
      print_success(&record.description);
    } else {
      print_failure(&format!("{} [{}]", record.description, record.outcome.label()));
    }
  }

  let summary = format!("{} passed, {} failed", report.passed(), report.failed());
  if report.is_success() {
    print_success(&summary);
  } else {
    print_error(&summary);
  }
}
